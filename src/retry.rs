// src/retry.rs
//! One retry primitive for fetch, summarize and notify: bounded attempts, per-attempt timeout,
//! exponential backoff with optional jitter, and cooperative cancellation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Classifies an error for the retry loop.
pub trait Transient {
    /// `false` stops the loop immediately.
    fn is_transient(&self) -> bool {
        true
    }

    /// Server-requested wait; the loop never sleeps less than this.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

// Collaborator errors (transport, decode) are all worth another attempt.
impl Transient for anyhow::Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the `attempt`-th failure (1-based): base · 2^(attempt-1), capped.
    /// With jitter the delay is drawn from [d/2, d].
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let exp = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);
        if !self.jitter || exp.is_zero() {
            return exp;
        }
        let ms = exp.as_millis().min(u128::from(u64::MAX)) as u64;
        let low = ms / 2;
        Duration::from_millis(rand::rng().random_range(low..=ms))
    }
}

/// Why a single attempt did not produce a value.
#[derive(Debug)]
pub enum AttemptError<E> {
    TimedOut(Duration),
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::TimedOut(d) => write!(f, "timed out after {}ms", d.as_millis()),
            AttemptError::Failed(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a transient error or a timeout.
    Exhausted { attempts: u32, last: AttemptError<E> },
    /// A non-transient error ended the loop early.
    Aborted { attempts: u32, error: E },
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Aborted { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { last, .. } => write!(f, "{last}"),
            RetryError::Aborted { error, .. } => write!(f, "{error}"),
            RetryError::Cancelled { .. } => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails non-transiently, runs out of attempts, or `cancel` fires.
/// `op` receives the 1-based attempt number. Each attempt is bounded by `timeout`.
pub async fn retry<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<Retried<T>, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            r = tokio::time::timeout(timeout, op(attempt)) => r,
        };

        let (err, hinted) = match outcome {
            Ok(Ok(value)) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                })
            }
            Ok(Err(e)) if !e.is_transient() => {
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    error: e,
                })
            }
            Ok(Err(e)) => {
                let hint = e.retry_after();
                (AttemptError::Failed(e), hint)
            }
            Err(_) => (AttemptError::TimedOut(timeout), None),
        };

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let mut delay = policy.backoff(attempt);
        if let Some(h) = hinted {
            delay = delay.max(h.min(policy.max_delay));
        }
        tracing::warn!(
            target: "retry",
            op = label,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
