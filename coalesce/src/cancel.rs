//! Cancellation of physical attempts.
//!
//! Two sources can stop an attempt: an explicit abort, raised through an
//! [`AbortSource`] that outlives individual attempts, and a per-attempt
//! timeout. A [`CancellationToken`] combines both and remembers which one
//! fired, because the transport usually reports either as the same generic
//! "operation cancelled" failure.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken as Signal;

/// Which source cancelled an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelledBy {
    /// An explicit abort.
    Abort,
    /// The attempt's timeout elapsed.
    Timeout,
}

/// An explicit-abort source.
///
/// Every in-flight entry owns one, shared by all of its attempts, so an abort
/// requested during a later attempt (or during a backoff pause) still lands.
/// Callers may also create their own and pass it in
/// [`RequestOptions::abort_source`](crate::RequestOptions::abort_source); firing
/// it aborts the entry the caller is attached to.
#[derive(Clone)]
pub struct AbortSource {
    inner: Arc<AbortInner>,
}

struct AbortInner {
    signal: Signal,
    reason: Mutex<Option<String>>,
}

/// The cancellation token of one physical attempt.
///
/// Handed to the transport inside an [`Attempt`](crate::Attempt); a transport
/// should stop work once [`cancelled`](CancellationToken::cancelled) resolves.
#[derive(Clone)]
pub struct CancellationToken {
    abort: AbortSource,
    signal: Signal,
    timed_out: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

// ===== impl AbortSource =====

impl AbortSource {
    /// Creates a source that has not fired.
    pub fn new() -> Self {
        AbortSource {
            inner: Arc::new(AbortInner {
                signal: Signal::new(),
                reason: Mutex::new(None),
            }),
        }
    }

    /// Fires the source without a reason.
    pub fn abort(&self) {
        self.fire(None);
    }

    /// Fires the source, recording `reason` unless it already fired.
    pub fn abort_with(&self, reason: impl Into<String>) {
        self.fire(Some(reason.into()));
    }

    pub(crate) fn fire(&self, reason: Option<String>) {
        let mut slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.signal.is_cancelled() {
            return;
        }
        *slot = reason;
        self.inner.signal.cancel();
    }

    /// Whether the source has fired.
    pub fn is_aborted(&self) -> bool {
        self.inner.signal.is_cancelled()
    }

    /// The reason given when the source fired, if any.
    pub fn reason(&self) -> Option<String> {
        self.inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves once the source fires.
    pub async fn aborted(&self) {
        self.inner.signal.cancelled().await
    }

    /// Whether both handles refer to the same source.
    pub fn same_source(&self, other: &AbortSource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn child(&self) -> Signal {
        self.inner.signal.child_token()
    }
}

impl Default for AbortSource {
    fn default() -> Self {
        AbortSource::new()
    }
}

impl fmt::Debug for AbortSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSource")
            .field("aborted", &self.is_aborted())
            .field("reason", &self.reason())
            .finish()
    }
}

// ===== impl CancellationToken =====

impl CancellationToken {
    /// Creates a token for a fresh attempt under `abort`.
    ///
    /// A zero `timeout` means no timeout.
    pub fn new(abort: &AbortSource, timeout: Option<Duration>) -> Self {
        CancellationToken {
            abort: abort.clone(),
            signal: abort.child(),
            timed_out: Arc::new(AtomicBool::new(false)),
            timeout: timeout.filter(|t| *t > Duration::from_secs(0)),
        }
    }

    /// Whether the attempt has been told to stop.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Which source cancelled the attempt, if any.
    ///
    /// Whichever source fired first is reported.
    pub fn cancelled_by(&self) -> Option<CancelledBy> {
        if self.timed_out.load(Ordering::Acquire) {
            Some(CancelledBy::Timeout)
        } else if self.abort.is_aborted() {
            Some(CancelledBy::Abort)
        } else {
            None
        }
    }

    /// Explicitly aborts, which stops this attempt and every later one of the
    /// same entry.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.abort.abort_with(reason);
    }

    /// Resolves once the attempt has been told to stop.
    pub async fn cancelled(&self) {
        self.signal.cancelled().await
    }

    /// The attempt's timeout, if it has one.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The abort source this token was derived from.
    pub fn abort_source(&self) -> &AbortSource {
        &self.abort
    }

    /// Fires the timeout source. Has no effect once the attempt is cancelled.
    pub(crate) fn expire(&self) {
        if self.signal.is_cancelled() {
            return;
        }
        self.timed_out.store(true, Ordering::Release);
        self.signal.cancel();
    }

    /// Drives `attempt` to completion, firing the timeout source once the
    /// timeout elapses.
    ///
    /// Cancellation is cooperative: after the timeout fires the attempt is
    /// still awaited until the transport settles.
    pub(crate) async fn run<F: Future>(&self, attempt: F) -> F::Output {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return attempt.await,
        };

        tokio::pin!(attempt);
        tokio::select! {
            biased;
            output = &mut attempt => return output,
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!(?timeout, "attempt timed out");
                self.expire();
            }
        }

        attempt.await
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled_by", &self.cancelled_by())
            .field("timeout", &self.timeout)
            .finish()
    }
}
