//! Bounded fixed-delay retry for transient infrastructure failures.
//!
//! Validation failures are never retried: the error type decides through
//! [`Retryable`] whether another attempt can help.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use linkpull_state::StorageError;
use serde::{Deserialize, Serialize};

use crate::config::{env_parse, ConfigError};

/// Default number of attempts, first try included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default pause between attempts.
pub const DEFAULT_WAIT_MS: u64 = 2_000;

/// Errors that know whether a retry may succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StorageError {
    fn is_transient(&self) -> bool {
        StorageError::is_transient(self)
    }
}

/// Retry settings shared by the store and host adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Fixed pause between attempts (milliseconds).
    pub wait_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_ms: DEFAULT_WAIT_MS,
        }
    }
}

/// Last error of a retried operation together with the attempt count.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub operation: String,
    pub attempts: u32,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.operation, self.attempts, self.error
        )
    }
}

impl<E: fmt::Display> From<RetryFailure<E>> for crate::error::LinkError {
    fn from(failure: RetryFailure<E>) -> Self {
        crate::error::LinkError::Transient {
            detail: format!("{} ({} attempt(s))", failure.error, failure.attempts),
            operation: failure.operation,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, wait_ms: u64) -> Self {
        Self {
            max_attempts,
            wait_ms,
        }
    }

    /// Single attempt, no waiting. Used by tests and dry runs.
    pub fn no_retry() -> Self {
        Self::new(1, 0)
    }

    /// Read `LINKPULL_RETRY_ATTEMPTS` and `LINKPULL_RETRY_WAIT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: env_parse("LINKPULL_RETRY_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            wait_ms: env_parse("LINKPULL_RETRY_WAIT_MS")?.unwrap_or(DEFAULT_WAIT_MS),
        })
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryFailure<E>>
    where
        E: Retryable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    tracing::warn!(operation, attempt, %error, "transient failure, retrying");
                    tokio::time::sleep(Duration::from_millis(self.wait_ms)).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(RetryFailure {
                        operation: operation.to_string(),
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Flaky(bool);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn failing(counter: &Arc<AtomicU32>, transient: bool, succeed_on: u32) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, Flaky>> + Send>> {
        let counter = counter.clone();
        move || {
            let c = counter.clone();
            Box::pin(async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(n)
                } else {
                    Err(Flaky(transient))
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let value = RetryPolicy::new(3, 2_000)
            .run("op", failing(&counter, true, 3))
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let failure = RetryPolicy::new(3, 10)
            .run("insert link", failing(&counter, true, u32::MAX))
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(failure.to_string().starts_with("insert link failed after 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let failure = RetryPolicy::default()
            .run("op", failing(&counter, false, u32::MAX))
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let _ = RetryPolicy::new(0, 0)
            .run("op", failing(&counter, true, u32::MAX))
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_storage_error_retryability() {
        assert!(Retryable::is_transient(&StorageError::Backend("down".into())));
        assert!(!Retryable::is_transient(&StorageError::SelfLink {
            pull: "a#1".into()
        }));
    }
}
