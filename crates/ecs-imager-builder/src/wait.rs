//! Polling remote operations until they reach an expected outcome.
//!
//! Every create call, delete call and status wait in the pipeline goes through
//! [`poll_until_expected`]: the request function is invoked, its result is
//! handed to an evaluation function, and the evaluation decides whether the
//! poller returns, retries after a backoff delay, or gives up.

use crate::error::{ApiError, PollError};
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use ecs_imager_common::defaults::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INTERVAL_SECS};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decision returned by an evaluation function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Expected outcome reached; return the response
    Succeed,
    /// Transient state; sleep and call again
    Retry,
    /// Fatal; stop without further attempts
    Fail,
}

/// Configuration for polling with backoff.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Maximum number of request attempts
    pub max_attempts: u32,
    /// Delay after the first retryable attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap for exponential growth)
    pub max_delay: Duration,
    /// Growth factor between delays; 1.0 gives a fixed interval
    pub factor: f32,
    /// Optional wall-clock limit across all attempts
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::fixed(
            DEFAULT_RETRY_ATTEMPTS,
            Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
        )
    }
}

impl PollConfig {
    /// Fixed-interval polling, the provider SDK's waiter behavior
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: interval,
            max_delay: interval,
            factor: 1.0,
            timeout: None,
        }
    }

    /// Poll until `timeout` elapses, one attempt per `interval`
    ///
    /// The attempt ceiling is derived from the timeout so both bounds agree.
    pub fn until(timeout: Duration, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let attempts = (timeout.as_millis() / interval.as_millis()).max(1);
        Self {
            timeout: Some(timeout),
            ..Self::fixed(u32::try_from(attempts).unwrap_or(u32::MAX), interval)
        }
    }

    /// Set a wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn delays(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts as usize)
            .build()
    }
}

/// Call `request` until `evaluate` reports success or the attempt ceiling is hit.
///
/// Uses `backon::ExponentialBuilder` for delay calculation and `tokio::select!`
/// so a cancelled token interrupts the backoff sleep.
///
/// # Arguments
/// * `config` - Attempt ceiling, backoff and optional timeout
/// * `cancel` - Optional cancellation token, checked before each attempt
/// * `what` - Description used in logs and errors
/// * `request` - Issues the remote call; assumed idempotent
/// * `evaluate` - Maps each result to Succeed, Retry or Fail
///
/// # Returns
/// * `Ok(T)` - The response that `evaluate` accepted
/// * `Err(PollError::Rejected)` - `evaluate` failed an error response
/// * `Err(PollError::Unexpected)` - `evaluate` failed a successful response
/// * `Err(PollError::Exhausted)` - still retrying after `max_attempts` calls
/// * `Err(PollError::TimedOut)` / `Err(PollError::Cancelled)`
///
/// # Example
/// ```ignore
/// let vsw_id = poll_until_expected(
///     &PollConfig::default(),
///     Some(&cancel),
///     "create vswitch",
///     || api.create_vswitch(request.clone()),
///     retry_on(&codes.create),
/// ).await?;
/// ```
pub async fn poll_until_expected<T, Req, Fut, Eval>(
    config: &PollConfig,
    cancel: Option<&CancellationToken>,
    what: &str,
    mut request: Req,
    mut evaluate: Eval,
) -> Result<T, PollError>
where
    Req: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    Eval: FnMut(&Result<T, ApiError>) -> PollOutcome,
{
    let start = Instant::now();
    let mut delays = config.delays();
    let mut attempts = 0u32;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(PollError::Cancelled {
                what: what.to_string(),
            });
        }

        attempts += 1;
        let result = request().await;

        let last_error = match (evaluate(&result), result) {
            (PollOutcome::Succeed, Ok(value)) => {
                debug!(what = %what, attempts, "Expected outcome reached");
                return Ok(value);
            }
            (PollOutcome::Succeed | PollOutcome::Fail, Err(source)) => {
                warn!(what = %what, attempts, error = %source, "Giving up on fatal error");
                return Err(PollError::Rejected {
                    what: what.to_string(),
                    source,
                });
            }
            (PollOutcome::Fail, Ok(_)) => {
                return Err(PollError::Unexpected {
                    what: what.to_string(),
                });
            }
            (PollOutcome::Retry, result) => result.err(),
        };

        if attempts >= config.max_attempts {
            warn!(what = %what, attempts, "Attempt ceiling reached");
            return Err(PollError::Exhausted {
                what: what.to_string(),
                attempts,
                last_error,
            });
        }

        if let Some(timeout) = config.timeout {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(PollError::TimedOut {
                    what: what.to_string(),
                    elapsed,
                    attempts,
                });
            }
        }

        let delay = delays.next().unwrap_or(config.max_delay);
        debug!(
            what = %what,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            code = last_error.as_ref().and_then(ApiError::code).unwrap_or(""),
            "Not ready, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                return Err(PollError::Cancelled { what: what.to_string() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_request(
        calls: &Arc<AtomicU32>,
        result: Result<u32, ApiError>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, ApiError>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(result.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_retry_stops_at_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = PollConfig::fixed(4, Duration::from_secs(5));

        let err = poll_until_expected(
            &config,
            None,
            "thing",
            counting_request(&calls, Ok(1)),
            |_| PollOutcome::Retry,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, PollError::Exhausted { attempts: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = poll_until_expected(
            &PollConfig::default(),
            None,
            "thing",
            counting_request(&calls, Err(ApiError::service("InvalidParameter", "bad"))),
            |_| PollOutcome::Fail,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            PollError::Rejected { source, .. } => {
                assert_eq!(source.code(), Some("InvalidParameter"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeed_after_retries() {
        let mut remaining = 2;
        let value = poll_until_expected(
            &PollConfig::default(),
            None,
            "thing",
            || std::future::ready(Ok::<_, ApiError>(42)),
            |_| {
                if remaining == 0 {
                    PollOutcome::Succeed
                } else {
                    remaining -= 1;
                    PollOutcome::Retry
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_on_ok_response_is_unexpected() {
        let err = poll_until_expected(
            &PollConfig::default(),
            None,
            "thing",
            || std::future::ready(Ok::<_, ApiError>(())),
            |_| PollOutcome::Fail,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::Unexpected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_keeps_last_error() {
        let err = poll_until_expected(
            &PollConfig::fixed(2, Duration::from_secs(1)),
            None,
            "thing",
            || std::future::ready(Err::<(), _>(ApiError::service("TaskConflict", "busy"))),
            |_| PollOutcome::Retry,
        )
        .await
        .unwrap_err();
        assert_eq!(err.api_error().and_then(ApiError::code), Some("TaskConflict"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_wait() {
        let calls = Arc::new(AtomicU32::new(0));
        let config =
            PollConfig::fixed(1000, Duration::from_secs(10)).with_timeout(Duration::from_secs(30));

        let err = poll_until_expected(
            &config,
            None,
            "thing",
            counting_request(&calls, Ok(0)),
            |_| PollOutcome::Retry,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::TimedOut { .. }));
        assert!(calls.load(Ordering::SeqCst) <= 5);
    }

    #[test]
    fn test_until_derives_attempts() {
        let config = PollConfig::until(Duration::from_secs(600), Duration::from_secs(5));
        assert_eq!(config.max_attempts, 120);
        assert_eq!(config.timeout, Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));

        let err = poll_until_expected(
            &PollConfig::default(),
            Some(&cancel),
            "thing",
            counting_request(&calls, Ok(0)),
            |_| PollOutcome::Retry,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let err = poll_until_expected(
            &PollConfig::fixed(100, Duration::from_secs(5)),
            Some(&cancel),
            "thing",
            || std::future::ready(Ok::<_, ApiError>(())),
            |_| PollOutcome::Retry,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::Cancelled { .. }));
    }
}
