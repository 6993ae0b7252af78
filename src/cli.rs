//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// piazza-feedback - scrape course forum posts and summarize student feedback
///
/// Groups Piazza posts by assignment and problem, then asks an LLM for
/// sentiment, common issues and suggestions per group.
///
/// Examples:
///   piazza-feedback list-classes
///   piazza-feedback scrape --limit 200
///   piazza-feedback analyze --students-only
///   piazza-feedback analyze --input categorized_posts_20250101_120000.json
///   piazza-feedback full
///   piazza-feedback init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .piazza-feedback.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding raw/ and analysis/ snapshots
    #[arg(long, value_name = "DIR", global = true, env = "PIAZZA_FEEDBACK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Piazza network (course) id to scrape
    #[arg(long, value_name = "NID", global = true, env = "PIAZZA_NETWORK_ID")]
    pub network_id: Option<String>,

    /// Model to use for analysis
    #[arg(short, long, global = true, env = "PIAZZA_FEEDBACK_MODEL")]
    pub model: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List your Piazza classes and their network ids
    ListClasses,

    /// Scrape posts and save categorized snapshots
    Scrape {
        /// Limit number of posts to fetch (default: all)
        #[arg(short, long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Analyze scraped posts with the LLM
    Analyze {
        /// Only analyze student-authored posts
        #[arg(short, long)]
        students_only: bool,

        /// Categorized snapshot to analyze (default: categorized_posts_latest.json)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Run the full pipeline (scrape, then analyze student posts)
    Full {
        /// Limit number of posts to fetch (default: all)
        #[arg(short, long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Generate a default .piazza-feedback.toml configuration file
    InitConfig,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match self.command {
            Command::Scrape { limit: Some(0) } | Command::Full { limit: Some(0) } => {
                return Err("Limit must be at least 1".to_string());
            }
            _ => {}
        }

        if let Command::Analyze {
            input: Some(ref input),
            ..
        } = self.command
        {
            if input.as_os_str().is_empty() {
                return Err("Input file path cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["piazza-feedback"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(parse(&["list-classes"]).command, Command::ListClasses);
        assert_eq!(
            parse(&["scrape", "--limit", "25"]).command,
            Command::Scrape { limit: Some(25) }
        );
        assert_eq!(
            parse(&["analyze", "-s", "-i", "snap.json"]).command,
            Command::Analyze {
                students_only: true,
                input: Some(PathBuf::from("snap.json")),
            }
        );
        assert_eq!(parse(&["full"]).command, Command::Full { limit: None });
        assert_eq!(parse(&["init-config"]).command, Command::InitConfig);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["analyze", "--verbose", "--data-dir", "/tmp/x"]);
        assert!(args.verbose);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["-v", "-q", "list-classes"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_limit() {
        assert!(parse(&["scrape", "--limit", "0"]).validate().is_err());
        assert!(parse(&["full", "-l", "0"]).validate().is_err());
        assert!(parse(&["scrape", "-l", "1"]).validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["list-classes"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Args::try_parse_from(["piazza-feedback"]).is_err());
    }
}
