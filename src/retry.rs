//! Bounded retries with exponential backoff and full jitter.
//!
//! Venue APIs drop requests under load right when the slate is busiest; all
//! outbound calls from the connectors go through one retry policy so a
//! transient 5xx never costs a scan cycle.

use anyhow::Result;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the initial try.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Cap on a single backoff sleep.
    pub max_delay_ms: u64,
    /// Cap on total elapsed time across all attempts.
    pub max_elapsed_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 1500,
            max_elapsed_ms: 4000,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0 && n <= 10)
                .unwrap_or(defaults.max_attempts),
            base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.base_delay_ms),
            max_delay_ms: std::env::var("RETRY_MAX_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_delay_ms),
            max_elapsed_ms: std::env::var("RETRY_MAX_ELAPSED_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_elapsed_ms),
        }
    }

    /// `min(max_delay, base * 2^(attempt-1))` with full jitter in
    /// `[0, backoff)` to spread concurrent retries out.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let capped = self.capped_backoff(attempt);
        if capped == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..capped)
        }
    }

    fn capped_backoff(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let multiplier = if exponent >= 32 {
            u64::MAX
        } else {
            1u64 << exponent
        };
        self.base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms)
    }
}

/// Classification of a failed call.
#[derive(Debug)]
pub struct RetryableError {
    pub status_code: Option<u16>,
    /// Honor a server-supplied Retry-After when present.
    pub retry_after_secs: Option<u64>,
    pub message: String,
}

impl RetryableError {
    pub fn from_status(status: u16, message: String) -> Self {
        Self {
            status_code: Some(status),
            retry_after_secs: None,
            message,
        }
    }

    pub fn from_network(message: String) -> Self {
        Self {
            status_code: None,
            retry_after_secs: None,
            message,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = err.to_string();
        if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
            if let Some(status) = reqwest_err.status() {
                return Self::from_status(status.as_u16(), message);
            }
            if reqwest_err.is_timeout() || reqwest_err.is_connect() {
                return Self::from_network(message);
            }
        }
        // Unclassified errors are treated as transient
        Self::from_network(message)
    }
}

/// Retryable: network failures, 408, 425, 429, and 5xx. Everything else in
/// 4xx is a real client error and retrying would just repeat it.
pub fn is_retryable(err: &RetryableError) -> bool {
    match err.status_code {
        Some(status) => matches!(status, 408 | 425 | 429 | 500..=599),
        None => true,
    }
}

/// Run `operation` under the policy, sleeping between attempts.
pub async fn retry_async<T, Fut, F>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start = std::time::Instant::now();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        event = "retry_recovered",
                        op = op_name,
                        attempts = attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                let retry_err = RetryableError::from_anyhow(&err);

                if !is_retryable(&retry_err) {
                    debug!(event = "retry_skipped", op = op_name, error = %retry_err.message);
                    return Err(err);
                }
                if attempt >= policy.max_attempts {
                    warn!(
                        event = "retry_exhausted",
                        op = op_name,
                        attempts = attempt,
                        error = %retry_err.message,
                    );
                    return Err(err);
                }
                let elapsed_ms = start.elapsed().as_millis() as u64;
                if elapsed_ms >= policy.max_elapsed_ms {
                    warn!(
                        event = "retry_timeout",
                        op = op_name,
                        elapsed_ms,
                        error = %retry_err.message,
                    );
                    return Err(err);
                }

                let mut backoff_ms = match retry_err.retry_after_secs {
                    Some(retry_after) => (retry_after * 1000).min(policy.max_delay_ms),
                    None => policy.backoff_ms(attempt),
                };
                backoff_ms = backoff_ms.min(policy.max_elapsed_ms.saturating_sub(elapsed_ms));

                debug!(
                    event = "retry_backoff",
                    op = op_name,
                    attempt,
                    backoff_ms,
                    status = retry_err.status_code,
                );

                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.capped_backoff(1), 100);
        assert_eq!(policy.capped_backoff(2), 200);
        assert_eq!(policy.capped_backoff(3), 400);
        assert_eq!(policy.capped_backoff(4), 800);
        // 1600 exceeds the cap
        assert_eq!(policy.capped_backoff(5), 1500);
        assert_eq!(policy.capped_backoff(40), 1500);
    }

    #[test]
    fn jitter_stays_below_the_cap() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            assert!(policy.backoff_ms(3) < 400);
        }
    }

    #[test]
    fn status_classification() {
        for status in [500u16, 502, 503, 504, 429, 408, 425] {
            assert!(is_retryable(&RetryableError::from_status(status, String::new())));
        }
        for status in [400u16, 401, 403, 404, 422] {
            assert!(!is_retryable(&RetryableError::from_status(status, String::new())));
        }
        assert!(is_retryable(&RetryableError::from_network(
            "connection reset".to_string()
        )));
    }

    #[tokio::test]
    async fn recovers_on_second_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_elapsed_ms: 1000,
        };
        let mut calls = 0;
        let result = retry_async(&policy, "fetch_markets", || {
            calls += 1;
            let fail = calls < 2;
            async move {
                if fail {
                    anyhow::bail!("upstream hiccup");
                }
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_elapsed_ms: 1000,
        };
        let mut calls = 0;
        let result: Result<i32> = retry_async(&policy, "fetch_price", || {
            calls += 1;
            async move { anyhow::bail!("still down") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
