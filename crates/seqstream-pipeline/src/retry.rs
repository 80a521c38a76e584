//! Backoff wrapper for calls to unreliable providers
//!
//! Only failures in the transient class (connection loss, timeouts, server-side
//! unavailability) are retried. Anything else is returned on the attempt that
//! produced it. The delay before attempt `k` (k >= 2) is
//! `base_delay * backoff_factor^(k-2)`.

use async_trait::async_trait;
use seqstream_core::ProviderError;
use std::fmt::Display;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that know whether they are worth retrying
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }
}

/// Announcement made before every retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
    /// 1-based index of the attempt about to be made
    pub attempt: u32,
    pub max_attempts: u32,
    /// Wait before that attempt starts
    pub delay: Duration,
    /// Failure of the previous attempt
    pub cause: String,
}

/// Receives retry notices; breaking aborts the retry loop
#[async_trait]
pub trait RetryObserver: Send {
    async fn on_retry(&mut self, notice: &RetryNotice) -> ControlFlow<()>;
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed transiently; `last` is the final failure
    Exhausted { attempts: u32, last: E },

    /// A non-transient failure; no further attempts were made
    Rejected { attempt: u32, error: E },

    /// The observer asked to stop before the next attempt
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: u32) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
        }
    }

    /// Delay before 1-based `attempt`; zero for the first attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = self.backoff_factor.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds, fails non-transiently, or the budget runs out
    pub async fn execute<T, E, F, Fut, O>(
        &self,
        mut operation: F,
        observer: &mut O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
        O: RetryObserver + ?Sized,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                debug!(attempt, %error, "non-transient failure, not retrying");
                return Err(RetryError::Rejected { attempt, error });
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, %error, "retry budget exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let notice = RetryNotice {
                attempt: attempt + 1,
                max_attempts,
                delay: self.delay_before(attempt + 1),
                cause: error.to_string(),
            };
            warn!(
                attempt = notice.attempt,
                max_attempts,
                delay_ms = notice.delay.as_millis() as u64,
                cause = %notice.cause,
                "transient failure, retrying"
            );

            if observer.on_retry(&notice).await.is_break() {
                return Err(RetryError::Cancelled);
            }

            tokio::time::sleep(notice.delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Default)]
    struct Recorder {
        notices: Vec<RetryNotice>,
        stop: bool,
    }

    #[async_trait]
    impl RetryObserver for Recorder {
        async fn on_retry(&mut self, notice: &RetryNotice) -> ControlFlow<()> {
            self.notices.push(notice.clone());
            if self.stop {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }

    fn unavailable() -> ProviderError {
        ProviderError::Unavailable {
            status: 503,
            body: "busy".into(),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
        assert_eq!(policy.delay_before(4), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let mut recorder = Recorder::default();
        let started = Instant::now();

        let result = RetryPolicy::default()
            .execute(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(ProviderError::Connection("reset".into()))
                    } else {
                        Ok(n)
                    }
                },
                &mut recorder,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let delays: Vec<_> = recorder.notices.iter().map(|n| n.delay).collect();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert_eq!(recorder.notices[0].attempt, 2);
        assert_eq!(recorder.notices[1].attempt, 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let mut recorder = Recorder::default();

        let result: Result<(), _> = RetryPolicy::default()
            .execute(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(unavailable())
                },
                &mut recorder,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(recorder.notices.len(), 2);
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: unavailable()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let mut recorder = Recorder::default();

        let result: Result<(), _> = RetryPolicy::default()
            .execute(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Rejected("unsupported file".into()))
                },
                &mut recorder,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(recorder.notices.is_empty());
        assert!(matches!(result, Err(RetryError::Rejected { attempt: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_can_cancel() {
        let calls = AtomicU32::new(0);
        let mut recorder = Recorder {
            stop: true,
            ..Default::default()
        };

        let result: Result<(), _> = RetryPolicy::default()
            .execute(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Timeout(Duration::from_secs(1)))
                },
                &mut recorder,
            )
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let policy = RetryPolicy::new(1, Duration::from_secs(2), 2);
        let result: Result<(), _> = policy
            .execute(|| async { Err(unavailable()) }, &mut Recorder::default())
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
    }
}
