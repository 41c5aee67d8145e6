//! Bounded retry with exponential backoff for transfer operations.
//!
//! Transient failures (network blips, timeouts, rate limits) are retried a
//! small bounded number of times with exponential backoff and jitter.
//! Fatal failures (authentication, not-found, permission) are returned
//! immediately so the repository fails without wasted attempts.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::migrate::{MigrateProgress, ProgressCallback, emit};
use crate::status::RepoKey;
use crate::transfer::TransferError;

/// Default initial backoff delay.
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Default maximum backoff delay.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Default number of retries for a single transfer operation.
pub const MAX_TRANSFER_RETRIES: usize = 3;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_TRANSFER_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Execute a transfer operation with automatic retry on transient errors.
///
/// Tracks attempts with an atomic counter, reports each backoff via the
/// progress callback, and returns the number of retries consumed alongside
/// the final result (success or the error that exhausted the policy).
/// Fatal errors short-circuit with zero retries.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
    key: &RepoKey,
    step: &str,
    on_progress: Option<&ProgressCallback>,
) -> (Result<T, TransferError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    let result = retry_op
        .retry(config.clone().into_backoff())
        .when(TransferError::is_transient)
        .notify(|err, dur| {
            let current_attempt = attempt.load(Ordering::SeqCst);
            emit(
                on_progress,
                MigrateProgress::RetryBackoff {
                    key: key.clone(),
                    step: step.to_string(),
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current_attempt,
                },
            );
            tracing::debug!(
                repo = %key,
                step,
                attempt = current_attempt,
                delay_ms = dur.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );
        })
        .await;

    let retries = attempt.load(Ordering::SeqCst).saturating_sub(1);
    (result, retries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn key() -> RepoKey {
        RepoKey::new("src/repo", "dst/repo")
    }

    fn fast_config() -> RetryConfig {
        RetryConfig::new(Duration::from_millis(1), Duration::from_millis(5), 3).with_jitter(false)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();

        assert_eq!(config.min_delay, Duration::from_millis(INITIAL_BACKOFF_MS));
        assert_eq!(config.max_delay, Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(config.max_retries, MAX_TRANSFER_RETRIES);
        assert!(config.with_jitter);
    }

    #[test]
    fn test_retry_config_custom() {
        let config = RetryConfig::new(Duration::from_secs(2), Duration::from_secs(30), 5);

        assert_eq!(config.min_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_retries, 5);
        assert!(config.with_jitter);
    }

    #[test]
    fn test_into_backoff() {
        let _backoff = RetryConfig::default().into_backoff();
        let _plain = RetryConfig::default().with_jitter(false).into_backoff();
    }

    #[tokio::test]
    async fn test_retries_transient_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                let n = calls_capture.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TransferError::network("connection reset"))
                } else {
                    Ok(42u32)
                }
            }
        };

        let (result, retries) = with_retry(&fast_config(), operation, &key(), "clone", None).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                calls_capture.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransferError::auth("bad token"))
            }
        };

        let (result, retries) = with_retry(&fast_config(), operation, &key(), "clone", None).await;

        assert!(matches!(result, Err(TransferError::Auth { .. })));
        assert_eq!(retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error_and_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                calls_capture.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransferError::timeout(1))
            }
        };

        let (result, retries) = with_retry(&fast_config(), operation, &key(), "push", None).await;

        assert!(matches!(result, Err(TransferError::Timeout { .. })));
        // max_retries = 3 means 1 initial attempt + 3 retries.
        assert_eq!(retries, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_backoff_emits_progress_events() {
        let events: Arc<Mutex<Vec<MigrateProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let events_capture = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            events_capture
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event);
        });

        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                let n = calls_capture.fetch_add(1, Ordering::SeqCst);
                if n < 1 {
                    Err(TransferError::network("reset"))
                } else {
                    Ok(())
                }
            }
        };

        let (result, retries) =
            with_retry(&fast_config(), operation, &key(), "clone", Some(&callback)).await;

        assert!(result.is_ok());
        assert_eq!(retries, 1);

        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        assert!(
            events
                .iter()
                .any(|e| matches!(e, MigrateProgress::RetryBackoff { .. }))
        );
    }
}
