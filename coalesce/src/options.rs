//! Per-request options and lifecycle hooks.

use crate::cancel::AbortSource;
use crate::error::Error;
use crate::retry::Backoff;
use crate::Response;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type ResponseHook = Arc<dyn Fn(&Response) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;
type RetryHook = Arc<dyn Fn(&RetryNotice) + Send + Sync>;

/// Options for a single logical request.
///
/// Unset fields fall back to the client's defaults. `timeout`, `retry`,
/// `retryable_statuses` and `backoff` only take effect for the call that
/// creates the in-flight entry: a call that attaches to an existing entry
/// inherits that entry's parameters.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry: Option<u32>,
    pub(crate) retryable_statuses: Option<BTreeSet<u16>>,
    pub(crate) backoff: Option<Arc<dyn Backoff>>,
    pub(crate) abort_source: Option<AbortSource>,
    pub(crate) callbacks: Callbacks,
}

/// The lifecycle hooks of one waiter.
///
/// On a failure the classification-specific hook (`on_abort`, `on_timeout`,
/// `on_client_error`, `on_server_error`) runs before `on_error`.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) on_success: Option<ResponseHook>,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) on_abort: Option<ErrorHook>,
    pub(crate) on_timeout: Option<ErrorHook>,
    pub(crate) on_client_error: Option<ErrorHook>,
    pub(crate) on_server_error: Option<ErrorHook>,
    pub(crate) on_retry: Option<RetryHook>,
}

/// Passed to `on_retry` each time an entry is retried.
#[derive(Clone, Debug)]
pub struct RetryNotice {
    /// The 1-based number of the attempt that failed.
    pub attempt: u32,
    /// Retries left after this one.
    pub retries_remaining: u32,
    /// The failure that triggered the retry.
    pub error: Error,
}

impl RequestOptions {
    /// Options that defer to the client's defaults.
    pub fn new() -> Self {
        RequestOptions::default()
    }

    /// Cancels each physical attempt after `timeout`. Zero disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Allows up to `retry` automatic retries.
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Overrides which status codes are retried.
    pub fn retryable_statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retryable_statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Waits according to `backoff` before each retry.
    pub fn backoff(mut self, backoff: impl Backoff) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Aborts the request (and every request sharing its transfer) when
    /// `source` fires.
    pub fn abort_source(mut self, source: AbortSource) -> Self {
        self.abort_source = Some(source);
        self
    }

    /// Runs after the request succeeds.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.callbacks.on_success = Some(Arc::new(f));
        self
    }

    /// Runs after any failure.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    /// Runs when the request is aborted.
    pub fn on_abort<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.callbacks.on_abort = Some(Arc::new(f));
        self
    }

    /// Runs when the final attempt timed out.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.callbacks.on_timeout = Some(Arc::new(f));
        self
    }

    /// Runs when the request ends with a `4xx` status.
    pub fn on_client_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.callbacks.on_client_error = Some(Arc::new(f));
        self
    }

    /// Runs when the request ends with a `5xx` status.
    pub fn on_server_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.callbacks.on_server_error = Some(Arc::new(f));
        self
    }

    /// Runs each time the shared transfer is retried.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryNotice) + Send + Sync + 'static,
    {
        self.callbacks.on_retry = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("retryable_statuses", &self.retryable_statuses)
            .field("backoff", &self.backoff.is_some())
            .field("abort_source", &self.abort_source)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_abort", &self.on_abort.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_client_error", &self.on_client_error.is_some())
            .field("on_server_error", &self.on_server_error.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}
