use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use warden_core::{AppError, AppResult, Cancellation};

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum RetryError {
    /// Transient failure; the operation may be attempted again.
    Retryable(AppError),
    /// Terminal failure; returned to the caller immediately.
    Fatal(AppError),
}

impl From<AppError> for RetryError {
    fn from(error: AppError) -> Self {
        Self::Fatal(error)
    }
}

/// Marks an error as safe to retry.
#[must_use]
pub fn retryable(error: AppError) -> RetryError {
    RetryError::Retryable(error)
}

/// Fibonacci backoff bounded by a total duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    initial_delay: Duration,
    max_duration: Duration,
}

impl RetryPolicy {
    /// Creates a Fibonacci policy.
    #[must_use]
    pub fn fibonacci(initial_delay: Duration, max_duration: Duration) -> Self {
        Self {
            initial_delay,
            max_duration,
        }
    }

    /// One-second Fibonacci backoff for up to two minutes.
    #[must_use]
    pub fn standard() -> Self {
        Self::fibonacci(Duration::from_secs(1), Duration::from_secs(120))
    }

    /// One-second Fibonacci backoff for up to one minute.
    #[must_use]
    pub fn short() -> Self {
        Self::fibonacci(Duration::from_secs(1), Duration::from_secs(60))
    }

    /// Returns the total time budget.
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Returns the delay sequence.
    #[must_use]
    pub fn backoff(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.initial_delay)
    }
}

/// Delays of `base`, `2*base`, `3*base`, `5*base`, `8*base`, ...
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    previous: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    /// Starts the sequence at `base`.
    #[must_use]
    pub fn new(base: Duration) -> Self {
        Self {
            previous: Duration::ZERO,
            current: base,
        }
    }
}

impl Iterator for FibonacciBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next;
        Some(next)
    }
}

/// Runs `operation` until it succeeds, fails fatally or the policy budget runs out.
///
/// When the budget runs out the last underlying error is returned.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    retry_with_cancellation(policy, &Cancellation::new(), operation).await
}

/// Like [`retry`], additionally stopping when `cancellation` fires.
pub async fn retry_with_cancellation<T, F, Fut>(
    policy: &RetryPolicy,
    cancellation: &Cancellation,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    let deadline = Instant::now() + policy.max_duration;
    let mut backoff = policy.backoff();
    let mut last_error: Option<AppError> = None;
    let mut attempt = 0_u32;

    loop {
        attempt = attempt.saturating_add(1);

        let outcome = tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                return Err(cancelled_error(last_error));
            }
            outcome = tokio::time::timeout_at(deadline, operation()) => outcome,
        };

        let error = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(RetryError::Fatal(error))) => return Err(error),
            Ok(Err(RetryError::Retryable(error))) => error,
            Err(_elapsed) => {
                return Err(last_error.unwrap_or_else(|| {
                    AppError::External(format!(
                        "operation did not complete within {:?}",
                        policy.max_duration
                    ))
                }));
            }
        };

        let delay = backoff.next().unwrap_or(policy.max_duration);
        if Instant::now() + delay > deadline {
            return Err(error);
        }

        debug!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "retrying after transient error"
        );
        last_error = Some(error);

        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                return Err(cancelled_error(last_error));
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancelled_error(last_error: Option<AppError>) -> AppError {
    match last_error {
        Some(error) => AppError::Cancelled(format!("retry cancelled after error: {error}")),
        None => AppError::Cancelled("retry cancelled".to_owned()),
    }
}
