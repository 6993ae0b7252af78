//! piazza-feedback - course forum feedback analyzer
//!
//! Scrapes Piazza posts, groups them by assignment and problem, and asks an
//! LLM to summarize sentiment, common issues and suggestions per group.
//!
//! Exit codes:
//!   0 - Success (including runs where some buckets failed to analyze)
//!   1 - Fatal error (authentication, fetch, configuration, bad pattern, I/O)

mod analysis;
mod cli;
mod config;
mod error;
mod forum;
mod llm;
mod models;
mod progress;
mod report;
mod retry;
mod snapshot;

use analysis::{Aggregator, Categorizer, CollectionStatistics};
use anyhow::{Context, Result};
use chrono::{Local, Utc};
use cli::{Args, Command};
use config::{Config, Credentials, CONFIG_FILE_NAME};
use forum::{ForumSource, PiazzaClient};
use llm::{AnthropicClient, CompletionClient};
use models::{AnalysisSnapshot, SnapshotMetadata};
use snapshot::SnapshotStore;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials and API keys may live in .env
    dotenv::dotenv().ok();

    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // No logging needed to write a config file
    if args.command == Command::InitConfig {
        return handle_init_config();
    }

    init_logging(&args);

    info!("piazza-feedback v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle `init-config`: generate a default config file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize patterns, model, limits, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let show_progress = !args.quiet;

    match args.command {
        Command::ListClasses => cmd_list_classes(&config, show_progress).await,
        Command::Scrape { limit } => cmd_scrape(&config, limit, show_progress).await.map(|_| ()),
        Command::Analyze {
            students_only,
            ref input,
        } => cmd_analyze(&config, input.as_deref(), students_only, show_progress).await,
        Command::Full { limit } => {
            let categorized = cmd_scrape(&config, limit, show_progress).await?;
            cmd_analyze(&config, Some(categorized.as_path()), true, show_progress).await
        }
        Command::InitConfig => handle_init_config(),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    load_config_in(args, Path::new("."))
}

/// Load configuration, looking for the default file in `dir`.
///
/// A config file that exists but cannot be parsed is an error.
fn load_config_in(args: &Args, dir: &Path) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_from_dir(dir)
        .with_context(|| format!("Invalid {}", CONFIG_FILE_NAME))?
    {
        Some(config) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Log in with a saved cookie file if configured, else with email/password.
async fn connect_forum(config: &Config, show_progress: bool) -> Result<PiazzaClient> {
    let client = PiazzaClient::new(&config.forum)?.with_progress(show_progress);

    match config.forum.cookies_file {
        Some(ref cookies) => client.login_with_cookies(cookies).await?,
        None => {
            let credentials = Credentials::from_env()?;
            client.login(&credentials).await?;
        }
    }

    Ok(client)
}

async fn cmd_list_classes(config: &Config, show_progress: bool) -> Result<()> {
    let forum = connect_forum(config, show_progress).await?;
    let courses = forum.list_courses().await?;

    if courses.is_empty() {
        println!("No classes found for this account.");
        return Ok(());
    }

    println!("\n📚 Your classes:\n");
    for course in &courses {
        if course.term.is_empty() {
            println!("   {}  {}", course.id, course.name);
        } else {
            println!("   {}  {} ({})", course.id, course.name, course.term);
        }
    }
    println!("\nSet PIAZZA_NETWORK_ID in .env (or pass --network-id) to scrape a class.");
    Ok(())
}

/// Scrape, categorize and persist. Returns the timestamped categorized snapshot.
async fn cmd_scrape(config: &Config, limit: Option<usize>, show_progress: bool) -> Result<PathBuf> {
    // Bad patterns fail before any network traffic
    let categorizer = Categorizer::new(&config.patterns)?;
    let network_id = config.require_network_id()?;
    let store = SnapshotStore::new(&config.general.data_dir);

    let forum = connect_forum(config, show_progress).await?;

    println!("📥 Fetching posts from network {}", network_id);
    let posts = forum.fetch_posts(network_id, limit).await?;
    if posts.is_empty() {
        warn!("No posts returned for network {}", network_id);
    }

    let categorized = categorizer.categorize(&posts);
    print_statistics(&analysis::statistics(&categorized));

    let ts = snapshot::timestamp(&Local::now());
    let files = store.save_scrape(&posts, &categorized, &ts)?;

    println!("\n✅ Scrape complete!");
    println!("   Posts: {}", files.all_posts.display());
    println!("   Categorized: {}", files.categorized.display());
    println!("   Latest: {}", files.latest.display());
    Ok(files.categorized)
}

fn print_statistics(stats: &CollectionStatistics) {
    println!("\n📊 Scrape Summary:");
    println!("   Total posts: {}", stats.total_posts);
    println!("   Assignments detected: {}", stats.total_assignments);
    println!(
        "   Resolved: {} | Unresolved: {}",
        stats.resolved_count, stats.unresolved_count
    );
    println!(
        "   Answers: {} | Follow-ups: {}",
        stats.total_answers, stats.total_followups
    );

    for (assignment, count) in &stats.posts_by_assignment {
        println!("   - {}: {} posts", assignment, count);
    }
}

async fn cmd_analyze(
    config: &Config,
    input: Option<&Path>,
    students_only: bool,
    show_progress: bool,
) -> Result<()> {
    let start_time = Instant::now();

    let api_key = config.require_api_key()?;
    let store = SnapshotStore::new(&config.general.data_dir);
    debug!("Snapshot directory: {}", store.raw_dir().display());

    let (mut categorized, source) = store.load_categorized(input)?;
    info!(
        "Loaded {} posts in {} buckets from {}",
        categorized.total_posts(),
        categorized.bucket_count(),
        source.display()
    );

    if students_only {
        categorized = analysis::students_only(&categorized);
        info!("Kept {} student posts", categorized.total_posts());
    }

    if categorized.is_empty() {
        warn!("No posts to analyze");
    }

    let client = AnthropicClient::new(&config.model, api_key)?;

    println!("🤖 Analyzing {} buckets", categorized.bucket_count());
    println!("   Model: {}", client.model_name());
    println!("   Posts: {}", categorized.total_posts());

    let assignments = Aggregator::new(&client, &config.analysis)
        .with_progress(show_progress)
        .analyze_all(&categorized)
        .await;

    let buckets_total: usize = assignments.values().map(|problems| problems.len()).sum();
    let buckets_failed = assignments
        .values()
        .flat_map(|problems| problems.values())
        .filter(|outcome| outcome.is_failed())
        .count();

    let result = AnalysisSnapshot {
        metadata: SnapshotMetadata {
            generated_at: Utc::now(),
            model_used: client.model_name().to_string(),
            source: source.display().to_string(),
            students_only,
            buckets_total,
            buckets_failed,
            posts_analyzed: categorized.total_posts(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        assignments,
    };

    println!("\n📝 Generating report...");
    let json = report::generate_json_report(&result)?;
    let markdown = report::generate_markdown_report(&result);
    let ts = snapshot::timestamp(&Local::now());
    let files = store.save_analysis(&json, &markdown, &ts)?;

    println!("\n📊 Analysis Summary:");
    println!(
        "   Buckets: {} analyzed, {} failed",
        buckets_total - buckets_failed,
        buckets_failed
    );
    println!("   Duration: {:.1}s", result.metadata.duration_seconds);

    let failures = report::failure_summary(&result);
    if !failures.is_empty() {
        println!();
        print!("{}", failures);
    }

    println!("\n✅ Analysis complete!");
    println!("   Analysis: {}", files.analysis.display());
    println!("   Report: {}", files.report.display());
    println!(
        "   Latest: {} and {}",
        files.analysis_latest.display(),
        files.report_latest.display()
    );
    Ok(())
}
