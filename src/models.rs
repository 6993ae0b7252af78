//! Data models for the feedback analyzer.
//!
//! This module contains the core data structures used throughout the
//! application: scraped posts, the categorized collection, and the
//! per-bucket analysis snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label used for the fallback problem bucket, and for the fallback
/// assignment when no assignment pattern matches.
pub const GENERAL_LABEL: &str = "general";

/// Role of a post's author. Names are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    #[default]
    Student,
    Anonymous,
    Ta,
    Instructor,
}

impl AuthorRole {
    /// Anonymous posts are counted as student posts.
    pub fn is_student(&self) -> bool {
        matches!(self, AuthorRole::Student | AuthorRole::Anonymous)
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorRole::Student => write!(f, "student"),
            AuthorRole::Anonymous => write!(f, "anonymous"),
            AuthorRole::Ta => write!(f, "TA"),
            AuthorRole::Instructor => write!(f, "instructor"),
        }
    }
}

/// Who wrote an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerAuthor {
    Student,
    Instructor,
}

/// An answer attached to a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub author: AnswerAuthor,
    pub text: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub endorsements: usize,
}

/// A reply inside a follow-up discussion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default)]
    pub created_at: String,
}

/// A follow-up discussion on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Followup {
    pub text: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

/// A single scraped forum thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// Post number as shown in the forum UI (`@123`).
    #[serde(default)]
    pub nr: u64,
    pub title: String,
    pub body: String,
    /// Post type: question, note, poll...
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author_role: AuthorRole,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub followups: Vec<Followup>,
    pub resolved: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub unique_views: u64,
}

/// A course the logged-in user can access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub term: String,
}

/// Posts grouped by assignment label, then problem label.
///
/// Within a bucket, posts keep their scrape order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorizedPosts {
    buckets: BTreeMap<String, BTreeMap<String, Vec<Post>>>,
}

impl CategorizedPosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a post to the (assignment, problem) bucket.
    pub fn insert(&mut self, assignment: &str, problem: &str, post: Post) {
        self.buckets
            .entry(assignment.to_string())
            .or_default()
            .entry(problem.to_string())
            .or_default()
            .push(post);
    }

    /// Posts in one bucket, if it exists.
    #[cfg(test)]
    pub fn get(&self, assignment: &str, problem: &str) -> Option<&[Post]> {
        self.buckets
            .get(assignment)
            .and_then(|problems| problems.get(problem))
            .map(Vec::as_slice)
    }

    /// Iterate over `(assignment, problem, posts)` in key order.
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &str, &[Post])> {
        self.buckets.iter().flat_map(|(assignment, problems)| {
            problems
                .iter()
                .map(move |(problem, posts)| (assignment.as_str(), problem.as_str(), posts.as_slice()))
        })
    }

    /// Problems and their posts under one assignment.
    pub fn assignments(&self) -> &BTreeMap<String, BTreeMap<String, Vec<Post>>> {
        &self.buckets
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    pub fn total_posts(&self) -> usize {
        self.buckets().map(|(_, _, posts)| posts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_posts() == 0
    }

    /// Keep only posts matching `keep`, dropping buckets and assignments
    /// left empty.
    pub fn retain_posts<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&Post) -> bool,
    {
        let mut filtered = Self::new();
        for (assignment, problem, posts) in self.buckets() {
            for post in posts.iter().filter(|p| keep(p)) {
                filtered.insert(assignment, problem, post.clone());
            }
        }
        filtered
    }
}

/// Three-step scale used for issue severity, suggestion priority and effort.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "Low"),
            Level::Medium => write!(f, "Medium"),
            Level::High => write!(f, "High"),
        }
    }
}

impl Level {
    /// Returns an emoji representation of the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            Level::Low => "🟢",
            Level::Medium => "🟡",
            Level::High => "🔴",
        }
    }
}

impl From<&str> for Level {
    /// Lenient parse for model output; anything unrecognized is medium.
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" | "minor" => Level::Low,
            "high" | "critical" | "severe" | "major" => Level::High,
            _ => Level::Medium,
        }
    }
}

/// Overall mood of a bucket's posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// 1 (very negative) to 5 (very positive).
    pub score: f64,
    pub summary: String,
}

/// A recurring difficulty students ran into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEntry {
    pub issue: String,
    /// How many students mentioned it, as reported by the model.
    pub frequency: String,
    pub severity: Level,
}

/// An actionable change for course staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion: String,
    pub priority: Level,
    pub effort: Level,
}

/// Counts and themes for one bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStatistics {
    pub total_posts: usize,
    pub resolved_count: usize,
    #[serde(default)]
    pub key_themes: Vec<String>,
}

impl BucketStatistics {
    /// Share of resolved posts in percent, if there are any posts.
    pub fn resolution_rate(&self) -> Option<f64> {
        if self.total_posts == 0 {
            None
        } else {
            Some(self.resolved_count as f64 / self.total_posts as f64 * 100.0)
        }
    }
}

/// Successful analysis of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketAnalysis {
    pub sentiment: Sentiment,
    pub common_issues: Vec<IssueEntry>,
    pub suggestions: Vec<Suggestion>,
    pub statistics: BucketStatistics,
}

/// Why a bucket has no analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The model answered, but not with the expected structure.
    AnalysisParseError,
    /// The request failed after all retries.
    AnalysisRequestError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::AnalysisParseError => write!(f, "AnalysisParseError"),
            FailureKind::AnalysisRequestError => write!(f, "AnalysisRequestError"),
        }
    }
}

/// Error marker stored in place of a bucket's analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Result of analyzing one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BucketOutcome {
    Analyzed(BucketAnalysis),
    Failed(BucketFailure),
}

impl BucketOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, BucketOutcome::Failed(_))
    }
}

/// Outcomes keyed by assignment label, then problem label.
pub type AnalysisTree = BTreeMap<String, BTreeMap<String, BucketOutcome>>;

/// Metadata about an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub generated_at: DateTime<Utc>,
    pub model_used: String,
    /// The categorized snapshot the analysis was run on.
    pub source: String,
    pub students_only: bool,
    pub buckets_total: usize,
    pub buckets_failed: usize,
    pub posts_analyzed: usize,
    pub duration_seconds: f64,
}

/// The complete persisted result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub metadata: SnapshotMetadata,
    pub assignments: AnalysisTree,
}

impl AnalysisSnapshot {
    /// Every failed bucket as `(assignment, problem, failure)`.
    pub fn failures(&self) -> Vec<(&str, &str, &BucketFailure)> {
        self.assignments
            .iter()
            .flat_map(|(assignment, problems)| {
                problems.iter().filter_map(move |(problem, outcome)| match outcome {
                    BucketOutcome::Failed(failure) => {
                        Some((assignment.as_str(), problem.as_str(), failure))
                    }
                    BucketOutcome::Analyzed(_) => None,
                })
            })
            .collect()
    }
}
