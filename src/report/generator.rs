//! Markdown and JSON report generation.
//!
//! Assignments and problems appear in natural label order with the
//! `general` fallback last. Issues are listed by severity and suggestions
//! by priority, highest first; equal entries keep the model's order.

use crate::models::{
    AnalysisSnapshot, BucketAnalysis, BucketFailure, BucketOutcome, Level, SnapshotMetadata,
    GENERAL_LABEL,
};
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Generate the complete Markdown report.
pub fn generate_markdown_report(snapshot: &AnalysisSnapshot) -> String {
    let mut output = String::new();

    output.push_str("# Piazza Feedback Report\n\n");
    output.push_str(&generate_metadata_section(&snapshot.metadata));
    output.push_str(&generate_overview_section(snapshot));
    output.push_str(&generate_assignments_section(snapshot));
    output.push_str(&generate_failures_section(snapshot));
    output.push_str(&generate_footer());

    output
}

/// Pretty-printed JSON of the whole snapshot.
pub fn generate_json_report(snapshot: &AnalysisSnapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).map_err(Into::into)
}

/// One line per failed bucket, for the terminal.
pub fn failure_summary(snapshot: &AnalysisSnapshot) -> String {
    let failures = snapshot.failures();
    if failures.is_empty() {
        return String::new();
    }

    let mut summary = String::new();
    summary.push_str(&format!("⚠️  {} bucket(s) could not be analyzed:\n", failures.len()));
    for (assignment, problem, failure) in failures {
        summary.push_str(&format!(
            "   - {}/{}: {} ({})\n",
            assignment,
            problem,
            failure.kind,
            failure.message
        ));
    }
    summary
}

/// Sort key for assignment and problem labels: numbers numerically,
/// then alphabetic suffixes, then other text, then the fallback.
fn compare_labels(a: &str, b: &str) -> Ordering {
    fn key(label: &str) -> (bool, u64, &str) {
        let digits = label.bytes().take_while(u8::is_ascii_digit).count();
        let number = label[..digits].parse().unwrap_or(u64::MAX);
        (label == GENERAL_LABEL, number, &label[digits..])
    }
    key(a).cmp(&key(b))
}

fn sorted_by_label<V>(map: &BTreeMap<String, V>) -> Vec<(&str, &V)> {
    let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by(|a, b| compare_labels(a.0, b.0));
    entries
}

fn assignment_heading(assignment: &str) -> String {
    if assignment == GENERAL_LABEL {
        "General (no assignment detected)".to_string()
    } else {
        format!("Assignment {}", assignment)
    }
}

fn problem_heading(problem: &str) -> String {
    if problem == GENERAL_LABEL {
        "General questions".to_string()
    } else {
        format!("Problem {}", problem)
    }
}

/// Keep Markdown table cells on one line.
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn generate_metadata_section(metadata: &SnapshotMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Source:** `{}`\n", metadata.source));
    section.push_str(&format!(
        "- **Posts:** {}\n",
        if metadata.students_only {
            "student posts only"
        } else {
            "all posts"
        }
    ));
    section.push_str(&format!("- **Analysis Duration:** {:.1}s\n", metadata.duration_seconds));
    section.push('\n');

    section
}

fn generate_overview_section(snapshot: &AnalysisSnapshot) -> String {
    let metadata = &snapshot.metadata;
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str("| Buckets | ✅ Analyzed | ❌ Failed | Posts |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} |\n",
        metadata.buckets_total,
        metadata.buckets_total.saturating_sub(metadata.buckets_failed),
        metadata.buckets_failed,
        metadata.posts_analyzed
    ));
    section.push('\n');

    if !snapshot.assignments.is_empty() {
        section.push_str("| Assignment | Problems | Avg. Sentiment |\n");
        section.push_str("|:---|:---:|:---:|\n");
        for (assignment, problems) in sorted_by_label(&snapshot.assignments) {
            let scores: Vec<f64> = problems
                .values()
                .filter_map(|outcome| match outcome {
                    BucketOutcome::Analyzed(analysis) => Some(analysis.sentiment.score),
                    BucketOutcome::Failed(_) => None,
                })
                .collect();
            let average = if scores.is_empty() {
                "n/a".to_string()
            } else {
                format!("{:.1}/5", scores.iter().sum::<f64>() / scores.len() as f64)
            };
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                assignment_heading(assignment),
                problems.len(),
                average
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_assignments_section(snapshot: &AnalysisSnapshot) -> String {
    let mut section = String::new();

    if snapshot.assignments.is_empty() {
        section.push_str("No posts were analyzed.\n\n");
        return section;
    }

    for (assignment, problems) in sorted_by_label(&snapshot.assignments) {
        section.push_str(&format!("## {}\n\n", assignment_heading(assignment)));

        for (problem, outcome) in sorted_by_label(problems) {
            section.push_str(&format!("### {}\n\n", problem_heading(problem)));
            match outcome {
                BucketOutcome::Analyzed(analysis) => {
                    section.push_str(&generate_analysis_block(analysis));
                }
                BucketOutcome::Failed(failure) => {
                    section.push_str(&generate_failure_block(failure));
                }
            }
            section.push_str("---\n\n");
        }
    }

    section
}

fn generate_analysis_block(analysis: &BucketAnalysis) -> String {
    let mut block = String::new();
    let stats = &analysis.statistics;

    block.push_str(&format!(
        "**Sentiment:** {:.1}/5: {}\n\n",
        analysis.sentiment.score,
        analysis.sentiment.summary
    ));

    block.push_str(&format!("**Posts:** {} ({} resolved", stats.total_posts, stats.resolved_count));
    if let Some(rate) = stats.resolution_rate() {
        block.push_str(&format!(", {:.0}%", rate));
    }
    block.push_str(")\n\n");

    if !analysis.common_issues.is_empty() {
        block.push_str("#### Common Issues\n\n");
        let mut issues: Vec<_> = analysis.common_issues.iter().collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));

        for (i, issue) in issues.iter().enumerate() {
            block.push_str(&format!(
                "{}. {} **{}**: {}",
                i + 1,
                issue.severity.emoji(),
                issue.severity,
                issue.issue
            ));
            if !issue.frequency.is_empty() {
                block.push_str(&format!(" _({})_", issue.frequency));
            }
            block.push('\n');
        }
        block.push('\n');
    }

    if !analysis.suggestions.is_empty() {
        block.push_str("#### Suggestions\n\n");
        let mut suggestions: Vec<_> = analysis.suggestions.iter().collect();
        suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));

        for (i, suggestion) in suggestions.iter().enumerate() {
            block.push_str(&format!(
                "{}. {} **{} priority** (effort: {}): {}\n",
                i + 1,
                suggestion.priority.emoji(),
                suggestion.priority,
                effort_label(suggestion.effort),
                suggestion.suggestion
            ));
        }
        block.push('\n');
    }

    if !stats.key_themes.is_empty() {
        block.push_str(&format!("**Key themes:** {}\n\n", stats.key_themes.join(", ")));
    }

    block
}

fn effort_label(effort: Level) -> &'static str {
    match effort {
        Level::Low => "low",
        Level::Medium => "medium",
        Level::High => "high",
    }
}

fn generate_failure_block(failure: &BucketFailure) -> String {
    format!("> ❌ **{}:** {}\n\n", failure.kind, failure.message)
}

fn generate_failures_section(snapshot: &AnalysisSnapshot) -> String {
    let failures = snapshot.failures();
    if failures.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Failed Buckets\n\n");
    section.push_str("| Assignment | Problem | Error | Message |\n");
    section.push_str("|:---|:---|:---|:---|\n");
    for (assignment, problem, failure) in failures {
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            assignment,
            problem,
            failure.kind,
            table_cell(&failure.message)
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "*Report generated by piazza-feedback*\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BucketStatistics, FailureKind, IssueEntry, Sentiment, Suggestion,
    };
    use chrono::Utc;

    fn issue(text: &str, severity: Level) -> IssueEntry {
        IssueEntry {
            issue: text.to_string(),
            frequency: String::new(),
            severity,
        }
    }

    fn analysis() -> BucketAnalysis {
        BucketAnalysis {
            sentiment: Sentiment {
                score: 2.5,
                summary: "Mixed feelings".to_string(),
            },
            common_issues: vec![
                issue("issue-low", Level::Low),
                issue("issue-high-first", Level::High),
                issue("issue-medium", Level::Medium),
                issue("issue-high-second", Level::High),
            ],
            suggestions: vec![
                Suggestion {
                    suggestion: "suggest-medium".to_string(),
                    priority: Level::Medium,
                    effort: Level::Low,
                },
                Suggestion {
                    suggestion: "suggest-high".to_string(),
                    priority: Level::High,
                    effort: Level::High,
                },
            ],
            statistics: BucketStatistics {
                total_posts: 4,
                resolved_count: 3,
                key_themes: vec!["gradients".to_string(), "notation".to_string()],
            },
        }
    }

    fn snapshot() -> AnalysisSnapshot {
        let mut assignments: BTreeMap<String, BTreeMap<String, BucketOutcome>> = BTreeMap::new();
        for (a, p) in [("10", "1"), ("2", GENERAL_LABEL), ("2", "10"), ("2", "3"), (GENERAL_LABEL, GENERAL_LABEL)] {
            assignments
                .entry(a.to_string())
                .or_default()
                .insert(p.to_string(), BucketOutcome::Analyzed(analysis()));
        }
        assignments.get_mut("2").unwrap().insert(
            "4b".to_string(),
            BucketOutcome::Failed(BucketFailure {
                kind: FailureKind::AnalysisParseError,
                message: "response contains no JSON object".to_string(),
                raw_response: Some("sorry".to_string()),
            }),
        );

        AnalysisSnapshot {
            metadata: SnapshotMetadata {
                generated_at: Utc::now(),
                model_used: "test-model".to_string(),
                source: "categorized_posts_latest.json".to_string(),
                students_only: true,
                buckets_total: 6,
                buckets_failed: 1,
                posts_analyzed: 20,
                duration_seconds: 12.0,
            },
            assignments,
        }
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{needle:?} not in report"))
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&snapshot());

        assert!(markdown.contains("# Piazza Feedback Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Overview"));
        assert!(markdown.contains("`test-model`"));
        assert!(markdown.contains("| 6 | 5 | 1 | 20 |"));
        assert!(markdown.contains("**Sentiment:** 2.5/5: Mixed feelings"));
        assert!(markdown.contains("**Posts:** 4 (3 resolved, 75%)"));
        assert!(markdown.contains("**Key themes:** gradients, notation"));
    }

    #[test]
    fn test_issues_sorted_by_severity_stably() {
        let block = generate_analysis_block(&analysis());

        let high_first = position(&block, "issue-high-first");
        let high_second = position(&block, "issue-high-second");
        let medium = position(&block, "issue-medium");
        let low = position(&block, "issue-low");
        assert!(high_first < high_second);
        assert!(high_second < medium);
        assert!(medium < low);

        assert!(position(&block, "suggest-high") < position(&block, "suggest-medium"));
        assert!(block.contains("(effort: high)"));
    }

    #[test]
    fn test_natural_order_with_general_last() {
        let markdown = generate_markdown_report(&snapshot());

        let a2 = position(&markdown, "## Assignment 2\n");
        let a10 = position(&markdown, "## Assignment 10\n");
        let general = position(&markdown, "## General (no assignment detected)");
        assert!(a2 < a10);
        assert!(a10 < general);

        let p3 = position(&markdown, "### Problem 3\n");
        let p4b = position(&markdown, "### Problem 4b\n");
        let p10 = position(&markdown, "### Problem 10\n");
        let pg = position(&markdown, "### General questions");
        assert!(a2 < p3 && p3 < p4b && p4b < p10 && p10 < pg && pg < a10);
    }

    #[test]
    fn test_failed_bucket_is_marked() {
        let markdown = generate_markdown_report(&snapshot());

        assert!(markdown.contains("> ❌ **AnalysisParseError:** response contains no JSON object"));
        assert!(markdown.contains("## Failed Buckets"));
        assert!(markdown.contains("| 2 | 4b | AnalysisParseError |"));
    }

    #[test]
    fn test_no_failures_section_when_all_succeed() {
        let mut snapshot = snapshot();
        snapshot.assignments.get_mut("2").unwrap().remove("4b");

        let markdown = generate_markdown_report(&snapshot);
        assert!(!markdown.contains("## Failed Buckets"));
        assert!(failure_summary(&snapshot).is_empty());
    }

    #[test]
    fn test_failure_summary() {
        let summary = failure_summary(&snapshot());
        assert!(summary.contains("1 bucket(s)"));
        assert!(summary.contains("2/4b: AnalysisParseError"));
    }

    #[test]
    fn test_compare_labels() {
        let mut labels = vec!["general", "10", "1a", "2", "1.2", "1", "intro"];
        labels.sort_by(|a, b| compare_labels(a, b));
        assert_eq!(labels, vec!["1", "1.2", "1a", "2", "10", "intro", "general"]);
    }

    #[test]
    fn test_generate_json_report() {
        let snapshot = snapshot();
        let json = generate_json_report(&snapshot).unwrap();

        let parsed: AnalysisSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
        assert!(json.contains("\"status\": \"failed\""));
        assert!(json.contains("\"kind\": \"AnalysisParseError\""));
    }
}
