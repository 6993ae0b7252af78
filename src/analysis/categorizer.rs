//! Post categorization by assignment and problem.
//!
//! Every post lands in exactly one bucket:
//! - assignment and problem found: `[assignment][problem]`
//! - assignment only: `[assignment]["general"]`
//! - neither: `["general"]["general"]`

use crate::analysis::patterns::PatternMatcher;
use crate::config::PatternConfig;
use crate::error::FeedbackError;
use crate::models::{CategorizedPosts, Post, GENERAL_LABEL};
use std::collections::BTreeMap;
use tracing::debug;

/// Routes posts into (assignment, problem) buckets.
#[derive(Debug, Clone)]
pub struct Categorizer {
    assignment: PatternMatcher,
    problem: PatternMatcher,
    include_followups: bool,
}

impl Categorizer {
    /// Compile the configured patterns. Fails on the first bad pattern.
    pub fn new(config: &PatternConfig) -> Result<Self, FeedbackError> {
        let assignment = PatternMatcher::new(&config.assignment)?;
        let problem = PatternMatcher::new(&config.problem)?;
        debug!(
            "Compiled {} assignment and {} problem patterns",
            assignment.len(),
            problem.len()
        );

        Ok(Self {
            assignment,
            problem,
            include_followups: config.include_followups,
        })
    }

    /// Build the categorized collection, keeping scrape order within buckets.
    pub fn categorize(&self, posts: &[Post]) -> CategorizedPosts {
        let mut categorized = CategorizedPosts::new();

        for post in posts {
            let (assignment, problem) = self.bucket_for(post);
            categorized.insert(&assignment, &problem, post.clone());
        }

        debug!(
            "Categorized {} posts into {} buckets",
            posts.len(),
            categorized.bucket_count()
        );
        categorized
    }

    /// The bucket key for a single post.
    ///
    /// Assignments are looked up in folders and tags, then in the text.
    /// Problems are looked up in the title, then folders, then the text.
    pub fn bucket_for(&self, post: &Post) -> (String, String) {
        let text = self.search_text(post);

        let assignment = post
            .folders
            .iter()
            .chain(post.tags.iter())
            .find_map(|label| self.assignment.first_match(label))
            .or_else(|| self.assignment.first_match(&text));

        let Some(assignment) = assignment else {
            return (GENERAL_LABEL.to_string(), GENERAL_LABEL.to_string());
        };

        let problem = self
            .problem
            .first_match(&post.title)
            .or_else(|| {
                post.folders
                    .iter()
                    .find_map(|folder| self.problem.first_match(folder))
            })
            .or_else(|| self.problem.first_match(&text))
            .unwrap_or_else(|| GENERAL_LABEL.to_string());

        (assignment, problem)
    }

    /// Title, body and (optionally) follow-ups, one per line.
    fn search_text(&self, post: &Post) -> String {
        let mut parts = vec![post.title.as_str(), post.body.as_str()];
        if self.include_followups {
            parts.extend(post.followups.iter().map(|f| f.text.as_str()));
        }
        parts.join("\n")
    }
}

/// Keep only student-authored (or anonymous) posts.
pub fn students_only(categorized: &CategorizedPosts) -> CategorizedPosts {
    categorized.retain_posts(|post| {
        let keep = post.author_role.is_student();
        if !keep {
            debug!("Skipping {} post {}", post.author_role, post.id);
        }
        keep
    })
}

/// Counts over a whole categorized collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStatistics {
    pub total_posts: usize,
    /// Distinct assignments, not counting the fallback bucket.
    pub total_assignments: usize,
    pub resolved_count: usize,
    pub unresolved_count: usize,
    pub total_answers: usize,
    pub total_followups: usize,
    pub posts_by_assignment: BTreeMap<String, usize>,
    pub posts_by_kind: BTreeMap<String, usize>,
}

/// Compute collection statistics.
pub fn statistics(categorized: &CategorizedPosts) -> CollectionStatistics {
    let mut stats = CollectionStatistics::default();

    for (assignment, problems) in categorized.assignments() {
        if assignment != GENERAL_LABEL {
            stats.total_assignments += 1;
        }

        let mut assignment_count = 0;
        for posts in problems.values() {
            assignment_count += posts.len();

            for post in posts {
                let kind = if post.kind.is_empty() {
                    "unknown"
                } else {
                    post.kind.as_str()
                };
                *stats.posts_by_kind.entry(kind.to_string()).or_default() += 1;

                if post.resolved {
                    stats.resolved_count += 1;
                } else {
                    stats.unresolved_count += 1;
                }

                stats.total_answers += post.answers.len();
                stats.total_followups += post.followups.len();
            }
        }

        stats.total_posts += assignment_count;
        stats
            .posts_by_assignment
            .insert(assignment.clone(), assignment_count);
    }

    stats
}
