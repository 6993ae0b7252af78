//! Error types.
//!
//! `FeedbackError` covers the failures that abort a run. `LlmError` covers a
//! single failed completion request; the aggregator turns those into
//! per-bucket failure markers instead of aborting.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors for a scrape or analysis run.
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// Forum credentials or session cookies were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or API failure while scraping, after retries.
    #[error("Failed to fetch {what}: {message}")]
    Fetch { what: String, message: String },

    /// A user-supplied categorization pattern is unusable.
    #[error("Invalid pattern `{pattern}`: {reason}")]
    PatternConfig { pattern: String, reason: String },

    /// Required settings (credentials, network id, API key) are missing.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FeedbackError {
    pub fn fetch(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PatternConfig {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from a single LLM completion request.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to LLM API at {0}")]
    Connect(String),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to send request: {0}")]
    Transport(String),

    #[error("Malformed API response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Timeouts, connection failures, rate limiting and server errors are
    /// worth another attempt; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::Connect(_) | LlmError::Transport(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Malformed(_) => false,
        }
    }
}
