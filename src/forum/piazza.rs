//! Piazza JSON-RPC client.
//!
//! Every call is `POST {base_url}/logic/api?method=<name>` with a body of
//! `{"method": <name>, "params": {...}}`. The server answers
//! `{"result": ..., "error": null | "<message>"}`. Session state lives in a
//! cookie jar; the `session_id` cookie is echoed back as `CSRF-Token`.

use crate::config::{Credentials, ForumConfig};
use crate::error::FeedbackError;
use crate::forum::parse::{parse_courses, parse_post};
use crate::forum::ForumSource;
use crate::models::{Course, Post};
use crate::progress;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

const SESSION_COOKIE: &str = "session_id";
const FEED_LIMIT_ALL: usize = 999_999;
const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// One failed RPC attempt.
#[derive(Debug, Error)]
enum RpcError {
    #[error("request timed out")]
    Timeout,

    #[error("cannot connect: {0}")]
    Connect(String),

    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("{0}")]
    Other(String),

    #[error("{0}")]
    Api(String),
}

impl RpcError {
    fn is_retryable(&self) -> bool {
        match self {
            RpcError::Timeout | RpcError::Connect(_) => true,
            RpcError::Status(status, _) => *status == 429 || *status >= 500,
            RpcError::Other(_) | RpcError::Api(_) => false,
        }
    }

    fn into_feedback(self, method: &str) -> FeedbackError {
        match self {
            RpcError::Status(401 | 403, body) => FeedbackError::Auth(body),
            RpcError::Api(message) if mentions_auth(&message) => FeedbackError::Auth(message),
            other => FeedbackError::fetch(method, other.to_string()),
        }
    }
}

fn mentions_auth(message: &str) -> bool {
    let message = message.to_lowercase();
    ["login", "log in", "logged in", "auth"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Authenticated Piazza session.
pub struct PiazzaClient {
    http_client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    request_delay: Duration,
    retry: RetryPolicy,
    show_progress: bool,
}

impl PiazzaClient {
    pub fn new(config: &ForumConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid forum base URL: {}", config.base_url))?;

        let jar = Arc::new(Jar::default());
        let http_client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            jar,
            base_url,
            request_delay: Duration::from_millis(config.request_delay_ms),
            retry: RetryPolicy::new(config.retries, Duration::from_millis(INITIAL_RETRY_DELAY_MS)),
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Log in with email and password.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), FeedbackError> {
        info!("Logging in to Piazza as {}", credentials.email);
        let result = self
            .rpc(
                "user.login",
                json!({"email": credentials.email, "pass": credentials.password}),
            )
            .await?;

        if result.as_str() == Some("OK") {
            Ok(())
        } else {
            Err(FeedbackError::Auth(format!("unexpected login result: {}", result)))
        }
    }

    /// Restore a browser session from a JSON map of cookie name to value,
    /// then check that it is still valid.
    pub async fn login_with_cookies(&self, path: &Path) -> Result<(), FeedbackError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FeedbackError::Config(format!("Cannot read cookie file {}: {}", path.display(), e))
        })?;
        let cookies: BTreeMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            FeedbackError::Config(format!("Invalid cookie file {}: {}", path.display(), e))
        })?;

        for (name, value) in &cookies {
            self.jar
                .add_cookie_str(&format!("{}={}; Path=/", name, value), &self.base_url);
        }
        debug!("Loaded {} cookies from {}", cookies.len(), path.display());

        let email = self.verify_session().await?;
        info!("Authenticated as {}", email);
        Ok(())
    }

    /// Check the current session with `user.status`, returning the email.
    pub async fn verify_session(&self) -> Result<String, FeedbackError> {
        let status = self.rpc("user.status", json!({})).await?;
        if status.is_null() {
            return Err(FeedbackError::Auth("session is not logged in".to_string()));
        }
        Ok(status
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    fn api_url(&self, method: &str) -> Result<Url, FeedbackError> {
        let mut url = self
            .base_url
            .join("/logic/api")
            .map_err(|e| FeedbackError::fetch(method, e.to_string()))?;
        url.query_pairs_mut().append_pair("method", method);
        Ok(url)
    }

    fn csrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let cookies = header.to_str().ok()?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
    }

    async fn send_rpc(&self, url: &Url, body: &Value) -> Result<Value, RpcError> {
        let mut request = self.http_client.post(url.clone()).json(body);
        if let Some(token) = self.csrf_token() {
            request = request.header("CSRF-Token", token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout
            } else if e.is_connect() {
                RpcError::Connect(e.to_string())
            } else {
                RpcError::Other(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status(status, body));
        }

        let mut envelope: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Other(format!("invalid JSON response: {}", e)))?;

        match envelope.get("error") {
            None | Some(Value::Null) => {}
            Some(Value::String(message)) => return Err(RpcError::Api(message.clone())),
            Some(other) => return Err(RpcError::Api(other.to_string())),
        }

        Ok(envelope
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Call one RPC method, retrying transient failures.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, FeedbackError> {
        let url = self.api_url(method)?;
        let body = json!({"method": method, "params": params});
        debug!("RPC {}", method);

        self.retry
            .run(method, || self.send_rpc(&url, &body), RpcError::is_retryable)
            .await
            .map_err(|e| e.into_feedback(method))
    }

    async fn feed_ids(&self, course_id: &str, limit: Option<usize>) -> Result<Vec<String>, FeedbackError> {
        let result = self
            .rpc(
                "network.get_my_feed",
                json!({"nid": course_id, "limit": limit.unwrap_or(FEED_LIMIT_ALL), "offset": 0}),
            )
            .await?;

        let mut ids: Vec<String> = result
            .get("feed")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|item| item.get("id").and_then(Value::as_str))
            .map(String::from)
            .collect();

        if let Some(limit) = limit {
            ids.truncate(limit);
        }
        Ok(ids)
    }
}

#[async_trait]
impl ForumSource for PiazzaClient {
    async fn list_courses(&self) -> Result<Vec<Course>, FeedbackError> {
        let status = self.rpc("user.status", json!({})).await?;
        Ok(parse_courses(&status))
    }

    async fn fetch_posts(&self, course_id: &str, limit: Option<usize>) -> Result<Vec<Post>, FeedbackError> {
        let ids = self.feed_ids(course_id, limit).await?;
        info!("Found {} posts to fetch", ids.len());

        let pb = progress::bar(ids.len() as u64, self.show_progress);
        pb.set_message("fetching posts");

        let mut posts = Vec::with_capacity(ids.len());
        for (i, cid) in ids.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }

            let raw = self
                .rpc("content.get", json!({"cid": cid, "nid": course_id}))
                .await?;
            if raw.is_null() {
                return Err(FeedbackError::fetch(
                    format!("post {}", cid),
                    "empty result from content.get",
                ));
            }
            posts.push(parse_post(&raw));
            pb.inc(1);
        }

        pb.finish_with_message("fetch complete");
        info!("Fetched {} posts", posts.len());
        Ok(posts)
    }
}
