//! Bounded-attempt retry with fixed or exponential backoff.
//!
//! Only transient errors (`CommandTimeout`, `Unreachable`,
//! `ConnectivityTimeout`) are retried. Everything else is returned on first
//! occurrence. Backoff sleeps end early on cancellation.

use std::future::Future;
use std::time::Duration;

use outpost_common::{BackoffKind, RetrySettings};
use tokio::time::Instant;
use tracing::warn;

use crate::application::cancel::CancelToken;
use crate::domain::ProvisionError;

/// Result of a retried action together with the attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ProvisionError>,
    /// Attempts made, including the first. Cancellation during backoff does
    /// not count as an attempt.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff: BackoffKind,
    deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Exponential backoff capped at 30s, no deadline.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            backoff: BackoffKind::Exponential,
            deadline: None,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff: settings.backoff,
            deadline: settings.deadline_secs.map(Duration::from_secs),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Bound the total time spent on one stage. No new attempt starts once
    /// the next backoff would cross it.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `failed`-th failed attempt (1-based). Never decreases
    /// as `failed` grows.
    #[must_use]
    pub fn delay_for(&self, failed: u32) -> Duration {
        let delay = match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let factor = 2u32.saturating_pow(failed.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Run `action` until it succeeds, fails fatally, runs out of attempts
    /// or deadline, or the session is cancelled.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancelToken, mut action: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProvisionError>>,
    {
        let started = Instant::now();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match action().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }
            if cancel.is_cancelled() {
                return Attempted {
                    result: Err(ProvisionError::Cancelled),
                    attempts,
                };
            }
            if attempts >= self.max_attempts {
                return exhausted(err, attempts);
            }

            let delay = self.delay_for(attempts);
            if let Some(deadline) = self.deadline
                && started.elapsed() + delay > deadline
            {
                warn!(attempts, deadline_secs = deadline.as_secs(), error = %err, "stage deadline reached");
                return exhausted(err, attempts);
            }

            warn!(
                attempt = attempts,
                max_attempts = self.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure, retrying"
            );
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    return Attempted {
                        result: Err(ProvisionError::Cancelled),
                        attempts,
                    };
                }
            }
        }
    }
}

fn exhausted<T>(last: ProvisionError, attempts: u32) -> Attempted<T> {
    Attempted {
        result: Err(ProvisionError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }),
        attempts,
    }
}
