//! Retry decisions.
//!
//! [`RetryPolicy`] is a pure decision function: it never sleeps or performs
//! I/O. The client applies the delay it computes between attempts.

use crate::error::Classification;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Computes how long to wait before a retry.
///
/// `attempt` is the 1-based number of the attempt that just failed.
///
/// # Closure
///
/// This trait provides a blanket implementation for closures of the type
/// `Fn(u32) -> Duration + Send + Sync + 'static`.
pub trait Backoff: Send + Sync + 'static {
    /// The delay before the attempt following `attempt`.
    fn backoff(&self, attempt: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Send + Sync + 'static,
{
    fn backoff(&self, attempt: u32) -> Duration {
        (self)(attempt)
    }
}

/// Doubling backoff: `min`, `2 * min`, `4 * min`, ... capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
}

/// Error returned when an [`ExponentialBackoff`] is configured inconsistently.
#[derive(Debug)]
pub struct InvalidBackoff(&'static str);

/// Decides whether a failed attempt is retried.
///
/// By default `Network` and `TimedOut` failures are retried, as are status
/// failures whose code is in the retryable set (408, 425, 429, 500, 502, 503,
/// 504). `Aborted` and `Unknown` are never retried.
#[derive(Clone)]
pub struct RetryPolicy {
    retryable_statuses: BTreeSet<u16>,
    backoff: Option<Arc<dyn Backoff>>,
}

/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

// ===== impl ExponentialBackoff =====

impl ExponentialBackoff {
    /// Creates a backoff starting at `min` and never exceeding `max`.
    ///
    /// # Errors
    ///
    /// Fails if `min` exceeds `max` or `max` is zero.
    pub fn new(min: Duration, max: Duration) -> Result<Self, InvalidBackoff> {
        if min > max {
            return Err(InvalidBackoff("maximum must not be less than minimum"));
        }
        if max == Duration::from_millis(0) {
            return Err(InvalidBackoff("maximum must be non-zero"));
        }
        Ok(ExponentialBackoff { min, max })
    }
}

impl Backoff for ExponentialBackoff {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.min
            .checked_mul(2_u32.saturating_pow(exponent))
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl fmt::Display for InvalidBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid backoff: {}", self.0)
    }
}

impl std::error::Error for InvalidBackoff {}

// ===== impl RetryPolicy =====

impl RetryPolicy {
    /// The default policy, retrying immediately.
    pub fn new() -> Self {
        RetryPolicy {
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.iter().copied().collect(),
            backoff: None,
        }
    }

    /// Replaces the set of retryable status codes.
    pub fn with_retryable_statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Waits according to `backoff` between attempts.
    pub fn with_backoff(mut self, backoff: impl Backoff) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    pub(crate) fn with_shared_backoff(mut self, backoff: Option<Arc<dyn Backoff>>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether a failure classified as `classification` is retried while
    /// `retries_remaining` retries are left.
    pub fn should_retry(&self, classification: &Classification, retries_remaining: u32) -> bool {
        if retries_remaining == 0 {
            return false;
        }

        match classification {
            Classification::Network | Classification::TimedOut => true,
            Classification::ClientStatus(status) | Classification::ServerStatus(status) => {
                self.retryable_statuses.contains(&status.as_u16())
            }
            Classification::Aborted | Classification::Unknown => false,
        }
    }

    /// How long to wait after attempt number `attempt` failed. Zero without a
    /// configured backoff.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .as_ref()
            .map(|backoff| backoff.backoff(attempt))
            .unwrap_or_default()
    }

    /// The retryable status codes.
    pub fn retryable_statuses(&self) -> impl Iterator<Item = u16> + '_ {
        self.retryable_statuses.iter().copied()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retryable_statuses", &self.retryable_statuses)
            .field("backoff", &self.backoff.is_some())
            .finish()
    }
}
