//! Bounded retry with linear backoff for transient failures.
//!
//! The engine wraps an arbitrary fallible async operation. Failures arrive
//! already mapped into [`ErrorKind`], so the retry decision is decoupled
//! from where the failure originated: the caller's predicate sees kinds,
//! never raw transport errors, and the fixed non-retryable set
//! ([`ErrorKind::is_never_retryable`]) is enforced centrally even when a
//! predicate would claim otherwise.
//!
//! Backoff is linear: the delay before attempt N is `base_delay * (N - 1)`.
//! Backoff sleeps race against the run's cancellation signal, so a
//! cancellation arriving mid-sleep takes effect immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::error::ErrorKind;

/// Default maximum attempts, including the initial one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base unit (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Terminal outcome of a retried operation that never succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RetryError {
    /// The last failure, with the total number of attempts made.
    #[error("operation failed with {kind} after {attempts} attempt(s)")]
    Fatal {
        /// Mapped kind of the final failure.
        kind: ErrorKind,
        /// How many times the operation ran (1-based).
        attempts: u32,
    },

    /// Cancellation arrived before the operation could succeed.
    ///
    /// Distinct from every [`ErrorKind`]; callers must not report this as
    /// an error outcome.
    #[error("operation cancelled")]
    Cancelled,
}

/// Retry policy: attempt bound plus linear backoff base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Maximum number of attempts, including the initial one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Linear backoff base unit.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Backoff delay after `failed_attempt` (1-based) fails: attempt 1
    /// waits one base unit, attempt 2 waits two, and so on.
    #[must_use]
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        self.base_delay.saturating_mul(failed_attempt)
    }

    /// The default retryability predicate: only kinds marked recoverable
    /// ([`ErrorKind::is_retryable_by_default`]) are retried.
    #[must_use]
    pub fn default_predicate(kind: ErrorKind) -> bool {
        kind.is_retryable_by_default()
    }

    /// Runs `operation` until it succeeds, a non-retryable failure occurs,
    /// attempts are exhausted, or cancellation fires.
    ///
    /// `operation` receives the 1-based attempt number. The engine never
    /// invokes it more than [`max_attempts`](Self::max_attempts) times, and
    /// a success short-circuits all remaining attempts.
    ///
    /// # Errors
    ///
    /// [`RetryError::Fatal`] with the final kind and attempt count, or
    /// [`RetryError::Cancelled`] when the signal fires first.
    pub async fn execute<T, F, Fut, P>(
        &self,
        cancel: &CancelSignal,
        is_retryable: P,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ErrorKind>>,
        P: Fn(ErrorKind) -> bool,
    {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            attempt += 1;
            debug!(attempt, max_attempts = self.max_attempts, "attempting operation");

            let kind = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(kind) => kind,
            };

            // The fixed set wins over the predicate.
            let retryable = !kind.is_never_retryable() && is_retryable(kind);
            if !retryable || attempt >= self.max_attempts {
                warn!(attempt, %kind, retryable, "giving up");
                return Err(RetryError::Fatal {
                    kind,
                    attempts: attempt,
                });
            }

            let delay = self.backoff_delay(attempt);
            debug!(
                attempt,
                next_attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                %kind,
                "will retry"
            );

            let mut cancel = cancel.clone();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::cancel;

    fn never_cancelled() -> CancelSignal {
        let (handle, signal) = cancel::pair();
        // Keep the channel alive without ever firing it.
        std::mem::forget(handle);
        signal
    }

    // ==================== Policy Construction Tests ====================

    #[test]
    fn test_default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_linear_backoff_delays() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(300));
    }

    // ==================== Execution Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_success_short_circuits() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = policy
            .execute(&never_cancelled(), RetryPolicy::default_predicate, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ErrorKind>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = policy
            .execute(&never_cancelled(), RetryPolicy::default_predicate, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ErrorKind::NetworkError) }
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            RetryError::Fatal {
                kind: ErrorKind::NetworkError,
                attempts: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_numbers_are_one_based() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let _: Result<(), _> = policy
            .execute(&never_cancelled(), RetryPolicy::default_predicate, move |n| {
                sink.lock().unwrap().push(n);
                async { Err(ErrorKind::NetworkError) }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_false_stops_immediately() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = policy
            .execute(&never_cancelled(), |_| false, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ErrorKind::NetworkError) }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RetryError::Fatal { attempts: 1, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_set_overrules_permissive_predicate() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));

        for kind in [
            ErrorKind::InvalidUrl,
            ErrorKind::PermissionDenied,
            ErrorKind::AgeRestricted,
            ErrorKind::GeoBlocked,
        ] {
            calls.store(0, Ordering::SeqCst);
            let counter = Arc::clone(&calls);
            let result: Result<(), _> = policy
                .execute(&never_cancelled(), |_| true, |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Err(kind) }
                })
                .await;

            assert_eq!(
                result.unwrap_err(),
                RetryError::Fatal { kind, attempts: 1 },
                "kind {kind:?} must not be retried"
            );
            assert_eq!(calls.load(Ordering::SeqCst), 1, "kind {kind:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_on_second_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = policy
            .execute(&never_cancelled(), RetryPolicy::default_predicate, move |n| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ErrorKind::NetworkError)
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_linearly_with_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        let _: Result<(), _> = policy
            .execute(&never_cancelled(), RetryPolicy::default_predicate, |_| async {
                Err(ErrorKind::NetworkError)
            })
            .await;

        // Delays: 1s after attempt 1, 2s after attempt 2; none after the last.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff_sleep() {
        let policy = RetryPolicy::new(3, Duration::from_secs(3600));
        let (handle, signal) = cancel::pair();

        let task = tokio::spawn(async move {
            policy
                .execute(&signal, RetryPolicy::default_predicate, |_| async {
                    Err::<(), _>(ErrorKind::NetworkError)
                })
                .await
        });

        // Let the first attempt fail and the backoff sleep begin.
        tokio::time::sleep(Duration::from_millis(1)).await;
        handle.cancel();

        let result = task.await.unwrap();
        assert_eq!(result.unwrap_err(), RetryError::Cancelled);
    }

    #[tokio::test]
    async fn test_pre_cancelled_signal_skips_operation() {
        let policy = RetryPolicy::default();
        let (handle, signal) = cancel::pair();
        handle.cancel();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .execute(&signal, RetryPolicy::default_predicate, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result.unwrap_err(), RetryError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
