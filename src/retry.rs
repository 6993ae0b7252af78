//! Bounded retry with exponential backoff.
//!
//! Shared by the forum client and the LLM client. Each call gets
//! `max_retries` extra attempts; the delay doubles after every failure and
//! is capped at `max_delay`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// How many times, and how patiently, to retry a failing operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. The last error is returned on failure.
    pub async fn run<T, E, F, Fut, R>(&self, what: &str, mut op: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_delay;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !is_retryable(&e) || attempt >= self.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt,
                        self.max_retries + 1,
                        backoff,
                        e
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<&str, String> = tokio_test::block_on(fast_policy(3).run(
            "flaky op",
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err("transient".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
            |_| true,
        ));

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), String> = tokio_test::block_on(fast_policy(2).run(
            "always failing",
            || {
                calls.set(calls.get() + 1);
                async { Err("boom".to_string()) }
            },
            |_| true,
        ));

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_non_retryable_fails_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), String> = tokio_test::block_on(fast_policy(5).run(
            "bad request",
            || {
                calls.set(calls.get() + 1);
                async { Err("400".to_string()) }
            },
            |e| e != "400",
        ));

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
