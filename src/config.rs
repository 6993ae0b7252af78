//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.piazza-feedback.toml` files, the environment, and CLI flags.

use crate::error::FeedbackError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".piazza-feedback.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Forum connection settings.
    #[serde(default)]
    pub forum: ForumConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Categorization patterns.
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Prompt size limits.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root directory for `raw/` and `analysis/` snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Forum (Piazza) settings. Credentials live in the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    /// Forum base URL; the RPC endpoint is `<base_url>/logic/api`.
    #[serde(default = "default_forum_url")]
    pub base_url: String,

    /// Course (network) id to scrape.
    #[serde(default)]
    pub network_id: Option<String>,

    /// JSON file of session cookies, for SSO logins.
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,

    /// Pause between post fetches.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Number of retries on transient failure.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_forum_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: default_forum_url(),
            network_id: None,
            cookies_file: None,
            request_delay_ms: default_request_delay_ms(),
            retries: default_retries(),
            timeout_seconds: default_forum_timeout(),
        }
    }
}

fn default_forum_url() -> String {
    "https://piazza.com".to_string()
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_retries() -> usize {
    3
}

fn default_forum_timeout() -> u64 {
    30
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Anthropic API base URL.
    #[serde(default = "default_model_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on failure.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: default_model_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
            retries: default_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_model_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model_timeout() -> u64 {
    120
}

fn default_initial_retry_delay_ms() -> u64 {
    1000
}

/// Ordered regex patterns for assignment and problem detection.
///
/// Each pattern needs one capture group holding the identifier. Order is
/// precedence: the first pattern that matches wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default = "default_assignment_patterns")]
    pub assignment: Vec<String>,

    #[serde(default = "default_problem_patterns")]
    pub problem: Vec<String>,

    /// Also search follow-up text when categorizing.
    #[serde(default)]
    pub include_followups: bool,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            assignment: default_assignment_patterns(),
            problem: default_problem_patterns(),
            include_followups: false,
        }
    }
}

fn default_assignment_patterns() -> Vec<String> {
    vec![
        r"pset\s*(\d+)",
        r"problem\s*set\s*(\d+)",
        r"hw\s*(\d+)",
        r"homework\s*(\d+)",
        r"assignment\s*(\d+)",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_problem_patterns() -> Vec<String> {
    vec![
        r"(?:problem|q|question|part)\s*(\d+(?:\.\d+)?(?:[a-z])?)",
        r"(?:prob|p)\.?\s*(\d+(?:\.\d+)?(?:[a-z])?)",
        r"\((\d+(?:\.\d+)?(?:[a-z])?)\)",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Bounds on the prompt built for each bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Posts beyond this are left out of the prompt.
    #[serde(default = "default_max_posts")]
    pub max_posts_per_bucket: usize,

    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,

    #[serde(default = "default_max_answer_chars")]
    pub max_answer_chars: usize,

    #[serde(default = "default_max_followups")]
    pub max_followups: usize,

    #[serde(default = "default_max_followup_chars")]
    pub max_followup_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_posts_per_bucket: default_max_posts(),
            max_body_chars: default_max_body_chars(),
            max_answer_chars: default_max_answer_chars(),
            max_followups: default_max_followups(),
            max_followup_chars: default_max_followup_chars(),
        }
    }
}

fn default_max_posts() -> usize {
    50
}

fn default_max_body_chars() -> usize {
    1500
}

fn default_max_answer_chars() -> usize {
    500
}

fn default_max_followups() -> usize {
    3
}

fn default_max_followup_chars() -> usize {
    200
}

/// Forum login credentials, read from the environment (`.env`).
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read `PIAZZA_EMAIL` and `PIAZZA_PASSWORD`.
    pub fn from_env() -> Result<Self, FeedbackError> {
        let email = non_empty_env("PIAZZA_EMAIL");
        let password = non_empty_env("PIAZZA_PASSWORD");

        match (email, password) {
            (Some(email), Some(password)) => Ok(Self { email, password }),
            _ => Err(FeedbackError::Config(
                "PIAZZA_EMAIL and PIAZZA_PASSWORD must be set in .env (or configure forum.cookies_file)"
                    .to_string(),
            )),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default file name in `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let default_path = dir.join(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(&default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their environment fallbacks) take precedence over
    /// config file settings, but only when actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.clone();
        }

        if let Some(ref network_id) = args.network_id {
            self.forum.network_id = Some(network_id.clone());
        }

        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
    }

    /// The configured network id, or a configuration error.
    pub fn require_network_id(&self) -> Result<&str, FeedbackError> {
        self.forum
            .network_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                FeedbackError::Config(
                    "PIAZZA_NETWORK_ID must be set in .env, via --network-id, or as forum.network_id"
                        .to_string(),
                )
            })
    }

    /// The LLM API key from the configured environment variable.
    pub fn require_api_key(&self) -> Result<String, FeedbackError> {
        non_empty_env(&self.model.api_key_env).ok_or_else(|| {
            FeedbackError::Config(format!("{} not set in .env", self.model.api_key_env))
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.analysis.max_posts_per_bucket, 50);
        assert_eq!(config.patterns.assignment[0], r"pset\s*(\d+)");
        assert_eq!(config.patterns.problem.len(), 3);
        assert!(config.forum.network_id.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
data_dir = "out"

[forum]
network_id = "abc123"
request_delay_ms = 0

[model]
name = "claude-3-5-haiku-latest"
retries = 1

[patterns]
assignment = ["lab\\s*(\\d+)"]
include_followups = true
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.data_dir, PathBuf::from("out"));
        assert_eq!(config.forum.network_id.as_deref(), Some("abc123"));
        assert_eq!(config.forum.request_delay_ms, 0);
        assert_eq!(config.model.name, "claude-3-5-haiku-latest");
        assert_eq!(config.model.retries, 1);
        assert_eq!(config.patterns.assignment, vec![r"lab\s*(\d+)"]);
        // Unspecified lists keep their defaults.
        assert_eq!(config.patterns.problem.len(), 3);
        assert!(config.patterns.include_followups);
    }

    #[test]
    fn test_merge_with_args() {
        let args = crate::cli::Args::try_parse_from([
            "piazza-feedback",
            "--data-dir",
            "elsewhere",
            "--network-id",
            "net42",
            "scrape",
        ])
        .unwrap();

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.general.data_dir, PathBuf::from("elsewhere"));
        assert_eq!(config.require_network_id().unwrap(), "net42");
    }

    #[test]
    fn test_missing_network_id() {
        let mut config = Config::default();
        config.forum.network_id = Some("  ".to_string());
        assert!(matches!(
            config.require_network_id(),
            Err(FeedbackError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_dir_without_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_from_dir_rejects_invalid_escape() {
        let dir = tempfile::TempDir::new().unwrap();
        // `\s` is not a valid escape in a basic TOML string.
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[patterns]\nassignment = [\"lab\\s*(\\d+)\"]\n",
        )
        .unwrap();

        let err = Config::load_from_dir(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[patterns]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.patterns.assignment, Config::default().patterns.assignment);
    }
}
