//! Client configuration.

use crate::client::Client;
use crate::descriptor::Descriptor;
use crate::key::{KeyHeaders, RequestKey};
use crate::middleware::Middleware;
use crate::retry::{Backoff, RetryPolicy};
use bytes::Bytes;
use http::header::HeaderName;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builds a [`Client`].
///
/// Every setting here is a client-wide default. [`RequestOptions`] override
/// them per request.
///
/// ```
/// use bytes::Bytes;
/// use coalesce::{transport_fn, Attempt, BoxError, Client, Descriptor, ExponentialBackoff};
/// use std::time::Duration;
///
/// async fn send(_attempt: Attempt) -> Result<http::Response<Bytes>, BoxError> {
///     Ok(http::Response::new(Bytes::new()))
/// }
///
/// let client = Client::builder()
///     .middleware(|d: Descriptor| d.with_header(
///         http::header::AUTHORIZATION,
///         http::HeaderValue::from_static("Bearer token"),
///     ))
///     .timeout(Duration::from_secs(5))
///     .retry(3)
///     .retryable_statuses(vec![429, 503])
///     .backoff(ExponentialBackoff::new(Duration::from_millis(50), Duration::from_secs(1)).unwrap())
///     .build(transport_fn(send));
/// # drop(client);
/// ```
///
/// [`RequestOptions`]: crate::RequestOptions
#[derive(Clone)]
pub struct ClientBuilder {
    config: Config,
}

/// Resolved client-wide settings.
#[derive(Clone)]
pub(crate) struct Config {
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) key_headers: KeyHeaders,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry: u32,
    pub(crate) policy: RetryPolicy,
}

impl ClientBuilder {
    /// Creates a builder with the default settings: no middleware, no
    /// timeout, no retries, the default retryable statuses, no backoff and the
    /// default [`KeyHeaders`].
    pub fn new() -> Self {
        ClientBuilder {
            config: Config {
                middleware: Vec::new(),
                key_headers: KeyHeaders::default(),
                timeout: None,
                retry: 0,
                policy: RetryPolicy::new(),
            },
        }
    }

    /// Appends a middleware. Middleware runs in the order it is added.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.config.middleware.push(Arc::new(middleware));
        self
    }

    /// Adds a header whose value participates in the dedup key.
    pub fn key_header(mut self, name: HeaderName) -> Self {
        self.config.key_headers.insert(name);
        self
    }

    /// Replaces the set of headers whose values participate in the dedup key.
    pub fn key_headers(mut self, headers: KeyHeaders) -> Self {
        self.config.key_headers = headers;
        self
    }

    /// Default per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Default retry budget.
    pub fn retry(mut self, retry: u32) -> Self {
        self.config.retry = retry;
        self
    }

    /// Default set of retryable status codes.
    pub fn retryable_statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.config.policy = self.config.policy.with_retryable_statuses(statuses);
        self
    }

    /// Default backoff between retries.
    pub fn backoff(mut self, backoff: impl Backoff) -> Self {
        self.config.policy = self.config.policy.with_backoff(backoff);
        self
    }

    /// Builds a client sending its requests through `transport`.
    pub fn build<T>(self, transport: T) -> Client<T> {
        Client::from_config(transport, self.config)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .finish()
    }
}

// ===== impl Config =====

impl Config {
    pub(crate) fn on_request(&self, descriptor: Descriptor) -> Descriptor {
        self.middleware
            .iter()
            .fold(descriptor, |descriptor, m| m.on_request(descriptor))
    }

    pub(crate) fn on_response(&self, response: http::Response<Bytes>) -> http::Response<Bytes> {
        self.middleware
            .iter()
            .fold(response, |response, m| m.on_response(response))
    }

    pub(crate) fn key(&self, descriptor: &Descriptor) -> RequestKey {
        RequestKey::with_headers(descriptor, &self.key_headers)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("middleware", &self.middleware.len())
            .field("key_headers", &self.key_headers)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("policy", &self.policy)
            .finish()
    }
}
