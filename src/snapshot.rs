//! On-disk snapshots.
//!
//! Layout under the data directory:
//!
//! ```text
//! raw/all_posts_<ts>.json
//! raw/categorized_posts_<ts>.json
//! raw/categorized_posts_latest.json
//! analysis/analysis_<ts>.json
//! analysis/analysis_latest.json
//! analysis/report_<ts>.md
//! analysis/report_latest.md
//! ```
//!
//! The `latest` files are plain copies.

use crate::error::FeedbackError;
use crate::models::{CategorizedPosts, Post};
use chrono::{DateTime, TimeZone};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const LATEST_CATEGORIZED: &str = "categorized_posts_latest.json";

/// Snapshot file name component for `time`.
pub fn timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Files written by a scrape.
#[derive(Debug, Clone)]
pub struct ScrapeFiles {
    pub all_posts: PathBuf,
    pub categorized: PathBuf,
    pub latest: PathBuf,
}

/// Files written by an analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisFiles {
    pub analysis: PathBuf,
    pub analysis_latest: PathBuf,
    pub report: PathBuf,
    pub report_latest: PathBuf,
}

pub struct SnapshotStore {
    raw_dir: PathBuf,
    analysis_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            raw_dir: data_dir.join("raw"),
            analysis_dir: data_dir.join("analysis"),
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Persist the flat post list and the categorized collection.
    pub fn save_scrape(
        &self,
        posts: &[Post],
        categorized: &CategorizedPosts,
        ts: &str,
    ) -> Result<ScrapeFiles, FeedbackError> {
        let files = ScrapeFiles {
            all_posts: self.raw_dir.join(format!("all_posts_{}.json", ts)),
            categorized: self.raw_dir.join(format!("categorized_posts_{}.json", ts)),
            latest: self.raw_dir.join(LATEST_CATEGORIZED),
        };

        write_json(&files.all_posts, posts)?;
        write_json(&files.categorized, categorized)?;
        copy_file(&files.categorized, &files.latest)?;

        info!(
            "Saved {} posts to {}",
            posts.len(),
            files.categorized.display()
        );
        Ok(files)
    }

    /// Load a categorized snapshot.
    ///
    /// Without `input`, the latest alias is used. A relative `input` that
    /// does not exist as given is looked up in the raw directory.
    pub fn load_categorized(&self, input: Option<&Path>) -> Result<(CategorizedPosts, PathBuf), FeedbackError> {
        let path = match input {
            None => self.raw_dir.join(LATEST_CATEGORIZED),
            Some(path) if path.exists() || path.is_absolute() => path.to_path_buf(),
            Some(path) => self.raw_dir.join(path),
        };

        if !path.exists() {
            return Err(FeedbackError::Config(format!(
                "No categorized snapshot at {}. Run `scrape` first.",
                path.display()
            )));
        }

        let categorized = read_json(&path)?;
        debug!("Loaded categorized snapshot {}", path.display());
        Ok((categorized, path))
    }

    /// Persist a rendered analysis snapshot and its Markdown report.
    pub fn save_analysis(
        &self,
        json: &str,
        markdown: &str,
        ts: &str,
    ) -> Result<AnalysisFiles, FeedbackError> {
        let files = AnalysisFiles {
            analysis: self.analysis_dir.join(format!("analysis_{}.json", ts)),
            analysis_latest: self.analysis_dir.join("analysis_latest.json"),
            report: self.analysis_dir.join(format!("report_{}.md", ts)),
            report_latest: self.analysis_dir.join("report_latest.md"),
        };

        write_text(&files.analysis, json)?;
        copy_file(&files.analysis, &files.analysis_latest)?;
        write_text(&files.report, markdown)?;
        copy_file(&files.report, &files.report_latest)?;

        info!("Saved analysis to {}", files.analysis.display());
        Ok(files)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FeedbackError + '_ {
    move |source| FeedbackError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), FeedbackError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(io_error(dir)),
        _ => Ok(()),
    }
}

fn write_text(path: &Path, content: &str) -> Result<(), FeedbackError> {
    ensure_parent(path)?;
    fs::write(path, content).map_err(io_error(path))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), FeedbackError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| FeedbackError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_text(path, &content)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FeedbackError> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&content).map_err(|source| FeedbackError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_file(from: &Path, to: &Path) -> Result<(), FeedbackError> {
    ensure_parent(to)?;
    fs::copy(from, to).map(|_| ()).map_err(io_error(to))
}
