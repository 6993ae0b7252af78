//! Ordered regex matching for assignment and problem identifiers.

use crate::error::FeedbackError;
use regex::{Regex, RegexBuilder};

/// An ordered list of compiled patterns. The first pattern that matches
/// anywhere in the text decides the label.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<Regex>,
}

impl PatternMatcher {
    /// Compile `patterns` case-insensitively, in order.
    ///
    /// Every pattern must compile and contain at least one capture group;
    /// the first offender is reported by its source text.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, FeedbackError> {
        let compiled = patterns
            .iter()
            .map(|source| {
                let source = source.as_ref();
                let regex = RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| FeedbackError::pattern(source, e.to_string()))?;
                if regex.captures_len() < 2 {
                    return Err(FeedbackError::pattern(
                        source,
                        "pattern needs a capture group for the identifier",
                    ));
                }
                Ok(regex)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns: compiled })
    }

    /// Label captured by the first matching pattern, lower-cased.
    ///
    /// `None` is the normal "no match" outcome.
    pub fn first_match(&self, text: &str) -> Option<String> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures(text)
                .and_then(|caps| caps.iter().skip(1).flatten().next())
                .map(|m| m.as_str().trim().to_lowercase())
                .filter(|label| !label.is_empty())
        })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;

    fn defaults() -> (PatternMatcher, PatternMatcher) {
        let config = PatternConfig::default();
        (
            PatternMatcher::new(&config.assignment).unwrap(),
            PatternMatcher::new(&config.problem).unwrap(),
        )
    }

    #[test]
    fn test_precedence_follows_configuration_order() {
        let matcher = PatternMatcher::new(&[r"pset\s*(\d+)", r"hw\s*(\d+)"]).unwrap();
        assert_eq!(matcher.first_match("pset 1 hw 2"), Some("1".to_string()));

        // Pattern order wins over position in the text.
        assert_eq!(matcher.first_match("hw 2 then pset 1"), Some("1".to_string()));

        let reversed = PatternMatcher::new(&[r"hw\s*(\d+)", r"pset\s*(\d+)"]).unwrap();
        assert_eq!(reversed.first_match("pset 1 hw 2"), Some("2".to_string()));
    }

    #[test]
    fn test_case_and_whitespace_tolerance() {
        let (assignment, _) = defaults();
        assert_eq!(assignment.first_match("PSET1 question"), Some("1".to_string()));
        assert_eq!(assignment.first_match("Pset 1 question"), Some("1".to_string()));
        assert_eq!(assignment.first_match("Problem Set 4"), Some("4".to_string()));
        assert_eq!(assignment.first_match("homework3"), Some("3".to_string()));
    }

    #[test]
    fn test_problem_identifiers() {
        let (_, problem) = defaults();
        assert_eq!(problem.first_match("Question 1.2"), Some("1.2".to_string()));
        assert_eq!(problem.first_match("part 2A is unclear"), Some("2a".to_string()));
        assert_eq!(problem.first_match("stuck on p.4"), Some("4".to_string()));
        assert_eq!(problem.first_match("see (3b)"), Some("3b".to_string()));
    }

    #[test]
    fn test_no_match() {
        let (assignment, problem) = defaults();
        assert_eq!(assignment.first_match("When are office hours?"), None);
        assert_eq!(problem.first_match("When are office hours?"), None);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = PatternMatcher::new(&[r"pset\s*(\d+)", r"hw(\d+"]).unwrap_err();
        match err {
            FeedbackError::PatternConfig { pattern, .. } => assert_eq!(pattern, r"hw(\d+"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pattern_without_group_is_rejected() {
        let err = PatternMatcher::new(&[r"pset\s*\d+"]).unwrap_err();
        assert!(matches!(err, FeedbackError::PatternConfig { .. }));
    }
}
