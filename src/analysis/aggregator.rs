//! Per-bucket LLM analysis.
//!
//! Each non-empty bucket becomes exactly one completion request. A bucket
//! whose request or response fails gets a failure marker; the remaining
//! buckets are still analyzed.

use crate::config::AnalysisConfig;
use crate::llm::CompletionClient;
use crate::models::{
    AnalysisTree, AnswerAuthor, BucketAnalysis, BucketFailure, BucketOutcome, BucketStatistics,
    CategorizedPosts, FailureKind, IssueEntry, Level, Post, Sentiment, Suggestion,
};
use crate::progress;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

const MIN_SCORE: f64 = 1.0;
const MAX_SCORE: f64 = 5.0;

/// Runs the analysis over a categorized collection.
pub struct Aggregator<'a, C: CompletionClient + ?Sized> {
    client: &'a C,
    limits: AnalysisConfig,
    show_progress: bool,
}

impl<'a, C: CompletionClient + ?Sized> Aggregator<'a, C> {
    pub fn new(client: &'a C, limits: &AnalysisConfig) -> Self {
        Self {
            client,
            limits: limits.clone(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Analyze every non-empty bucket, sequentially and in key order.
    pub async fn analyze_all(&self, categorized: &CategorizedPosts) -> AnalysisTree {
        let buckets: Vec<_> = categorized
            .buckets()
            .filter(|(_, _, posts)| !posts.is_empty())
            .collect();

        info!("Analyzing {} buckets with {}", buckets.len(), self.client.model_name());
        let pb = progress::bar(buckets.len() as u64, self.show_progress);

        let mut tree = AnalysisTree::new();
        for (assignment, problem, posts) in buckets {
            pb.set_message(format!("{}/{}", assignment, problem));

            let outcome = self.analyze_bucket(assignment, problem, posts).await;
            if let BucketOutcome::Failed(ref failure) = outcome {
                warn!(
                    "Bucket {}/{} failed ({}): {}",
                    assignment, problem, failure.kind, failure.message
                );
            }

            tree.entry(assignment.to_string())
                .or_default()
                .insert(problem.to_string(), outcome);
            pb.inc(1);
        }

        pb.finish_with_message("analysis complete");
        tree
    }

    /// Analyze a single bucket. Never fails; errors become markers.
    pub async fn analyze_bucket(&self, assignment: &str, problem: &str, posts: &[Post]) -> BucketOutcome {
        let prompt = build_prompt(assignment, problem, posts, &self.limits);
        debug!("Prompt for {}/{}: {} chars", assignment, problem, prompt.len());

        let response = match self.client.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                return BucketOutcome::Failed(BucketFailure {
                    kind: FailureKind::AnalysisRequestError,
                    message: e.to_string(),
                    raw_response: None,
                })
            }
        };

        match parse_analysis(&response, posts) {
            Ok(analysis) => BucketOutcome::Analyzed(analysis),
            Err(message) => BucketOutcome::Failed(BucketFailure {
                kind: FailureKind::AnalysisParseError,
                message,
                raw_response: Some(response),
            }),
        }
    }
}

/// Longest prefix of `s` with at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn resolved_count(posts: &[Post]) -> usize {
    posts.iter().filter(|p| p.resolved).count()
}

/// Build the bounded prompt for one bucket.
pub fn build_prompt(assignment: &str, problem: &str, posts: &[Post], limits: &AnalysisConfig) -> String {
    let shown = posts.len().min(limits.max_posts_per_bucket);
    let resolved = resolved_count(posts);

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Analyze the following student forum posts about assignment \"{}\", problem \"{}\".\n",
        assignment,
        problem
    ));
    prompt.push_str(
        "Each post lists its title, type, whether it was resolved, its content, \
         and any answers and follow-ups.\n\n",
    );
    prompt.push_str(&format!(
        "Bucket statistics: {} posts, {} resolved, {} unresolved.\n",
        posts.len(),
        resolved,
        posts.len() - resolved
    ));
    if shown < posts.len() {
        prompt.push_str(&format!(
            "Only the first {} posts are included below; {} more posts were omitted.\n",
            shown,
            posts.len() - shown
        ));
    }

    prompt.push_str("\nProvide:\n");
    prompt.push_str("1. Sentiment on a 1-5 scale (1 = very negative, 5 = very positive) with a brief justification.\n");
    prompt.push_str("2. The top 3-5 issues students struggled with, how often each came up, and its severity.\n");
    prompt.push_str("3. 3-5 concrete suggestions for improving the assignment, with priority and effort.\n");
    prompt.push_str("4. Key themes across the posts.\n\n");
    prompt.push_str("Respond with a JSON object of exactly this shape:\n");
    prompt.push_str(
        r#"{"sentiment": {"score": <number 1-5>, "summary": "<justification>"},
 "common_issues": [{"issue": "<description>", "frequency": "<how many students>", "severity": "low|medium|high"}],
 "suggestions": [{"suggestion": "<recommendation>", "priority": "low|medium|high", "effort": "low|medium|high"}],
 "statistics": {"total_posts": <int>, "resolved_count": <int>, "key_themes": ["<theme>"]}}"#,
    );
    prompt.push_str("\n\n=== STUDENT POSTS ===\n");

    for (i, post) in posts.iter().take(shown).enumerate() {
        prompt.push_str(&format!("\n--- Post {} ---\n", i + 1));
        prompt.push_str(&format!("Title: {}\n", post.title));
        prompt.push_str(&format!("Type: {}\n", post.kind));
        prompt.push_str(&format!("Resolved: {}\n", if post.resolved { "Yes" } else { "No" }));
        prompt.push_str(&format!("Views: {}\n", post.unique_views));
        prompt.push_str(&format!(
            "Answers: {} | Follow-ups: {}\n",
            post.answers.len(),
            post.followups.len()
        ));
        prompt.push_str(&format!(
            "Content: {}\n",
            truncate_chars(&post.body, limits.max_body_chars)
        ));

        if !post.answers.is_empty() {
            prompt.push_str("Answer text:\n");
            for answer in &post.answers {
                let who = match answer.author {
                    AnswerAuthor::Instructor => "instructor",
                    AnswerAuthor::Student => "student",
                };
                prompt.push_str(&format!(
                    "  [{}]: {}\n",
                    who,
                    truncate_chars(&answer.text, limits.max_answer_chars)
                ));
            }
        }

        if !post.followups.is_empty() && limits.max_followups > 0 {
            prompt.push_str("Follow-up text:\n");
            for followup in post.followups.iter().take(limits.max_followups) {
                prompt.push_str(&format!(
                    "  - {}\n",
                    truncate_chars(&followup.text, limits.max_followup_chars)
                ));
            }
        }
    }

    prompt.push_str("\n=== END OF POSTS ===\n\n");
    prompt.push_str("Return ONLY the JSON object, with no other text or markdown.");
    prompt
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    sentiment: RawSentiment,
    #[serde(default)]
    common_issues: Vec<RawIssue>,
    #[serde(default)]
    suggestions: Vec<RawSuggestion>,
    #[serde(default)]
    statistics: RawStatistics,
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    score: f64,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    issue: String,
    #[serde(default)]
    frequency: Value,
    #[serde(default)]
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    suggestion: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    effort: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStatistics {
    #[serde(default)]
    key_themes: Vec<String>,
}

fn level(raw: &Option<String>) -> Level {
    Level::from(raw.as_deref().unwrap_or(""))
}

fn frequency_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Drop a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string (e.g. `json`) on the opening line. A fence
    // without a line break wraps the body directly.
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// The outermost `{...}` span of the text.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a model response into a bucket analysis.
///
/// The score is clamped to 1-5 and the post and resolution counts are
/// taken from `posts`, not from the model.
pub fn parse_analysis(response: &str, posts: &[Post]) -> Result<BucketAnalysis, String> {
    let body = strip_code_fence(response);
    let json = outermost_object(body).ok_or_else(|| "response contains no JSON object".to_string())?;

    let raw: RawAnalysis =
        serde_json::from_str(json).map_err(|e| format!("response is not a valid analysis: {}", e))?;

    if !raw.sentiment.score.is_finite() {
        return Err("sentiment score is not a number".to_string());
    }

    Ok(BucketAnalysis {
        sentiment: Sentiment {
            score: raw.sentiment.score.clamp(MIN_SCORE, MAX_SCORE),
            summary: raw.sentiment.summary,
        },
        common_issues: raw
            .common_issues
            .into_iter()
            .map(|issue| IssueEntry {
                severity: level(&issue.severity),
                frequency: frequency_text(&issue.frequency),
                issue: issue.issue,
            })
            .collect(),
        suggestions: raw
            .suggestions
            .into_iter()
            .map(|s| Suggestion {
                priority: level(&s.priority),
                effort: level(&s.effort),
                suggestion: s.suggestion,
            })
            .collect(),
        statistics: BucketStatistics {
            total_posts: posts.len(),
            resolved_count: resolved_count(posts),
            key_themes: raw.statistics.key_themes,
        },
    })
}
