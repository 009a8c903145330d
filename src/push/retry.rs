//! Retry scheduling with exponential backoff.
//!
//! Wraps a single-attempt gateway operation in a bounded retry loop:
//! transient failures back off and retry, token invalidity is terminal
//! on the spot. The loop is explicit with a counter, so the attempt
//! count is directly observable in the outcome.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::push::gateway::GatewayOutcome;

/// Default maximum number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base backoff duration.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Cap on any single backoff wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Base backoff; delays grow `base * 2^0, 2^1, …` per retry.
    pub backoff_base: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl From<&crate::config::RetryPolicyConfig> for RetryConfig {
    fn from(config: &crate::config::RetryPolicyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base(),
        }
    }
}

/// Why a delivery ultimately failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    /// Gateway flagged the token as permanently invalid.
    TokenInvalid,
    /// Transient failures exhausted the retry budget.
    Transient,
}

/// Terminal result of a delivery attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Whether the gateway accepted the message.
    pub success: bool,
    /// Failure classification when `success` is false.
    pub error: Option<DeliveryErrorKind>,
    /// Total attempts made, including the first.
    pub attempts: u32,
}

impl AttemptOutcome {
    fn delivered(attempts: u32) -> Self {
        Self {
            success: true,
            error: None,
            attempts,
        }
    }

    fn failed(kind: DeliveryErrorKind, attempts: u32) -> Self {
        Self {
            success: false,
            error: Some(kind),
            attempts,
        }
    }
}

/// Drive one delivery through the retry policy.
///
/// `operation` makes a single gateway attempt per invocation. The sleep
/// between retries suspends only this task, never its siblings. Once
/// `cancelled` is observed no further backoff wait is started; the
/// attempts already made stand and the delivery is reported transient.
pub async fn deliver_with_backoff<F, Fut>(
    config: &RetryConfig,
    cancelled: &AtomicBool,
    mut operation: F,
) -> AttemptOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayOutcome>,
{
    let mut retries = 0u32;
    let mut backoff = config.backoff_base;

    loop {
        let attempts = retries + 1;

        match operation().await {
            GatewayOutcome::Delivered => return AttemptOutcome::delivered(attempts),
            GatewayOutcome::TokenInvalid => {
                debug!(attempts, "Token reported invalid, not retrying");
                return AttemptOutcome::failed(DeliveryErrorKind::TokenInvalid, attempts);
            }
            GatewayOutcome::TransientFailure(detail) => {
                if retries >= config.max_retries {
                    warn!(
                        attempts,
                        detail = %detail,
                        "Retry budget exhausted for push notification"
                    );
                    return AttemptOutcome::failed(DeliveryErrorKind::Transient, attempts);
                }
                if cancelled.load(Ordering::SeqCst) {
                    debug!(attempts, "Dispatch cancelled, skipping remaining retries");
                    return AttemptOutcome::failed(DeliveryErrorKind::Transient, attempts);
                }

                let wait = backoff.min(MAX_BACKOFF);
                debug!(
                    attempt = attempts,
                    backoff_ms = wait.as_millis() as u64,
                    detail = %detail,
                    "Transient push failure, retrying"
                );
                sleep(wait).await;

                backoff = (backoff * 2).min(MAX_BACKOFF);
                retries += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::time::Instant;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            backoff_base: Duration::from_millis(1),
        }
    }

    fn not_cancelled() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.backoff_base, DEFAULT_BACKOFF_BASE);
    }

    #[test]
    fn test_config_from_policy() {
        let policy = crate::config::RetryPolicyConfig {
            max_retries: 5,
            backoff_base_secs: 1,
        };
        let config = RetryConfig::from(&policy);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_delivered_first_attempt() {
        let cancelled = not_cancelled();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let outcome = deliver_with_backoff(&fast_config(3), &cancelled, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                GatewayOutcome::Delivered
            }
        })
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delivered_after_transient_failures() {
        let cancelled = not_cancelled();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let outcome = deliver_with_backoff(&fast_config(3), &cancelled, || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    GatewayOutcome::TransientFailure("hiccup".to_string())
                } else {
                    GatewayOutcome::Delivered
                }
            }
        })
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_transient_exhausts_retry_budget() {
        let cancelled = not_cancelled();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let outcome = deliver_with_backoff(&fast_config(3), &cancelled, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                GatewayOutcome::TransientFailure("down".to_string())
            }
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(DeliveryErrorKind::Transient));
        // Initial attempt + max_retries
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_token_invalid_never_retried() {
        let cancelled = not_cancelled();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let outcome = deliver_with_backoff(&fast_config(3), &cancelled, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                GatewayOutcome::TokenInvalid
            }
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(DeliveryErrorKind::TokenInvalid));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_doubles_per_retry() {
        let cancelled = not_cancelled();
        let config = RetryConfig {
            max_retries: 3,
            backoff_base: Duration::from_millis(20),
        };

        let start = Instant::now();
        let outcome = deliver_with_backoff(&config, &cancelled, || async {
            GatewayOutcome::TransientFailure("down".to_string())
        })
        .await;
        let elapsed = start.elapsed();

        assert_eq!(outcome.attempts, 4);
        // Delays 20ms * (2^0 + 2^1 + 2^2) = 140ms total
        assert!(elapsed >= Duration::from_millis(140), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_zero_retries_single_attempt() {
        let cancelled = not_cancelled();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let outcome = deliver_with_backoff(&fast_config(0), &cancelled, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                GatewayOutcome::TransientFailure("down".to_string())
            }
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_skips_backoff_waits() {
        let cancelled = AtomicBool::new(true);
        let config = RetryConfig {
            max_retries: 3,
            backoff_base: Duration::from_secs(60), // would stall without cancellation
        };

        let start = Instant::now();
        let outcome = deliver_with_backoff(&config, &cancelled, || async {
            GatewayOutcome::TransientFailure("down".to_string())
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&DeliveryErrorKind::TokenInvalid).unwrap();
        assert_eq!(json, "\"token_invalid\"");
        let json = serde_json::to_string(&DeliveryErrorKind::Transient).unwrap();
        assert_eq!(json, "\"transient\"");
    }
}
