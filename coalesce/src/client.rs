use crate::builder::{ClientBuilder, Config};
use crate::cancel::{AbortSource, CancellationToken, CancelledBy};
use crate::descriptor::Descriptor;
use crate::error::{BoxError, Classification, Error};
use crate::key::RequestKey;
use crate::options::{RequestOptions, RetryNotice};
use crate::registry::{Entry, InFlight, Phase, Registry};
use crate::transport::{self, Attempt};
use crate::waiter::{Handle, Outcome, ResponseFuture, RetryHooks, Target, Waiter};
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tower_service::Service;
use tracing::Instrument;

/// Coordinates requests sent through a transport `T`.
///
/// Requests with the same [`RequestKey`] that overlap in time share a single
/// physical transfer. Each in-flight transfer is driven by its own task on the
/// current tokio runtime; its outcome is fanned out to every caller attached
/// to it.
///
/// Cloning a `Client` is cheap and yields a handle to the same registry.
pub struct Client<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    transport: T,
    config: Config,
    registry: Mutex<Registry>,
    next_handle: AtomicU64,
}

/// Settles an entry's waiters if its driver goes away without doing so.
struct Orphan<T> {
    shared: Arc<Shared<T>>,
    key: RequestKey,
    armed: bool,
}

// ===== impl Client =====

impl Client<()> {
    /// Returns a builder for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<T> Client<T> {
    /// Creates a client with the default configuration.
    pub fn new(transport: T) -> Self {
        ClientBuilder::new().build(transport)
    }

    pub(crate) fn from_config(transport: T, config: Config) -> Self {
        Client {
            shared: Arc::new(Shared {
                transport,
                config,
                registry: Mutex::new(Registry::default()),
                next_handle: AtomicU64::new(0),
            }),
        }
    }

    /// Aborts the in-flight transfer `target` names.
    ///
    /// Every caller sharing the transfer fails with
    /// [`Classification::Aborted`], and no further retry is attempted. Returns
    /// `false` if nothing is in flight for `target`.
    pub fn abort(&self, target: impl Into<Target>) -> bool {
        self.abort_inner(target.into(), None)
    }

    /// Like [`abort`](Client::abort), recording `reason` on the delivered
    /// error.
    pub fn abort_with(&self, target: impl Into<Target>, reason: impl Into<String>) -> bool {
        self.abort_inner(target.into(), Some(reason.into()))
    }

    fn abort_inner(&self, target: Target, reason: Option<String>) -> bool {
        let mut registry = self.shared.lock();
        match registry.find_mut(&target) {
            Some(entry) => {
                tracing::debug!(key = %entry.key, ?reason, "abort requested");
                abort_entry(entry, reason);
                true
            }
            None => false,
        }
    }

    /// A snapshot of the in-flight transfer `target` names.
    pub fn get_in_flight(&self, target: impl Into<Target>) -> Option<InFlight> {
        self.shared
            .lock()
            .find(&target.into())
            .map(Entry::snapshot)
    }

    /// The descriptor the in-flight transfer `target` names is sending, after
    /// middleware.
    pub fn get_request(&self, target: impl Into<Target>) -> Option<Arc<Descriptor>> {
        self.shared
            .lock()
            .find(&target.into())
            .map(|entry| entry.descriptor.clone())
    }

    /// The number of physical transfers in flight.
    pub fn in_flight_len(&self) -> usize {
        self.shared.lock().len()
    }

    /// The key `descriptor` would be deduplicated under, after middleware.
    pub fn key_of(&self, descriptor: &Descriptor) -> RequestKey {
        let config = &self.shared.config;
        config.key(&config.on_request(descriptor.clone()))
    }
}

impl<T> Client<T>
where
    T: Service<Attempt, Response = http::Response<Bytes>> + Clone + Send + Sync + 'static,
    T::Error: Into<BoxError>,
    T::Future: Send + 'static,
{
    /// Issues a logical request.
    ///
    /// If a transfer with the same key is already in flight the caller is
    /// attached to it and no new transport call is made; `options` then only
    /// contributes its callbacks and abort source. Otherwise a new transfer is
    /// started with `options` layered over the client's defaults.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn request(&self, descriptor: Descriptor, options: RequestOptions) -> ResponseFuture {
        let shared = &self.shared;
        let descriptor = shared.config.on_request(descriptor);
        let key = shared.config.key(&descriptor);
        let handle = Handle(shared.next_handle.fetch_add(1, Ordering::Relaxed));
        let span = tracing::debug_span!(
            "in_flight",
            %key,
            method = %descriptor.method(),
            uri = %descriptor.uri()
        );

        let RequestOptions {
            timeout,
            retry,
            retryable_statuses,
            backoff,
            abort_source,
            callbacks,
        } = options;
        let (waiter, rx) = Waiter::new(handle, callbacks);

        let (created, abort, done, waiters) = {
            let mut registry = shared.lock();
            let (entry, created) = registry.get_or_create(key, waiter, || {
                let mut policy = shared.config.policy.clone();
                if let Some(statuses) = retryable_statuses {
                    policy = policy.with_retryable_statuses(statuses);
                }
                if backoff.is_some() {
                    policy = policy.with_shared_backoff(backoff);
                }
                Entry::new(
                    key,
                    descriptor,
                    retry.unwrap_or(shared.config.retry),
                    timeout.or(shared.config.timeout),
                    policy,
                )
            });
            (
                created,
                entry.abort.clone(),
                entry.done.clone(),
                entry.waiters.len(),
            )
        };

        tracing::trace!(%key, ?handle, created, waiters, "attached");

        if let Some(external) = abort_source {
            let shared = shared.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = external.aborted() => {
                        tracing::debug!(%key, "external abort source fired");
                        shared.abort_generation(&key, &abort, external.reason());
                    }
                    _ = done.cancelled() => {}
                }
            });
        }

        if created {
            tokio::spawn(drive(shared.clone(), key).instrument(span));
        }

        ResponseFuture::new(handle, key, rx)
    }
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Client {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.shared.config)
            .field("in_flight", &self.in_flight_len())
            .finish()
    }
}

// ===== impl Shared =====

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Aborts the entry for `key` if it is still the generation `abort`
    /// belongs to.
    fn abort_generation(&self, key: &RequestKey, abort: &AbortSource, reason: Option<String>) {
        let mut registry = self.lock();
        if let Some(entry) = registry
            .get_mut(key)
            .filter(|entry| entry.abort.same_source(abort))
        {
            abort_entry(entry, reason);
        }
    }
}

fn abort_entry(entry: &mut Entry, reason: Option<String>) {
    entry.retries_remaining = 0;
    entry.abort.fire(reason);
}

/// What the driver does after an attempt failed.
enum Next {
    Finish(Error),
    Retry {
        hooks: RetryHooks,
        notice: RetryNotice,
        delay: Duration,
        abort: AbortSource,
    },
}

/// Records the failure of attempt `number` on `entry` and decides whether
/// another attempt follows.
///
/// Runs under the registry lock. An abort that fired after the attempt was
/// classified still turns the failure into [`Classification::Aborted`].
fn after_failure(entry: &mut Entry, error: Error, number: u32) -> Next {
    let error = if entry.abort.is_aborted() && !error.is_aborted() {
        Error::aborted(entry.abort.reason(), Some(Box::new(error)))
    } else {
        error
    };

    entry.last_error = Some(error.clone());
    if error.is_aborted() {
        entry.retries_remaining = 0;
    }

    if !entry.policy.should_retry(&error.kind(), entry.retries_remaining) {
        return Next::Finish(error);
    }

    entry.retries_remaining -= 1;
    entry.phase = Phase::Retrying;

    Next::Retry {
        hooks: RetryHooks::collect(entry.waiters.iter()),
        notice: RetryNotice {
            attempt: number,
            retries_remaining: entry.retries_remaining,
            error,
        },
        delay: entry.policy.delay(number),
        abort: entry.abort.clone(),
    }
}

/// Runs the attempts of the entry for `key` until it reaches a terminal
/// outcome.
async fn drive<T>(shared: Arc<Shared<T>>, key: RequestKey)
where
    T: Service<Attempt, Response = http::Response<Bytes>> + Clone + Send + Sync + 'static,
    T::Error: Into<BoxError>,
{
    let orphan = Orphan::new(shared.clone(), key);

    loop {
        let (attempt, token) = {
            let mut registry = shared.lock();
            let entry = match registry.get_mut(&key) {
                Some(entry) => entry,
                None => return orphan.disarm(),
            };

            if entry.abort.is_aborted() {
                let error = Error::aborted(entry.abort.reason(), None);
                entry.retries_remaining = 0;
                entry.last_error = Some(error.clone());
                drop(registry);
                return orphan.finish(Err(error));
            }

            let (token, number) = entry.begin_attempt();
            let attempt = Attempt::new(entry.descriptor.clone(), token.clone(), number);
            (attempt, token)
        };

        let number = attempt.number();
        tracing::debug!(attempt = number, "sending");

        let result = token
            .run(transport::call(shared.transport.clone(), attempt))
            .await;

        let error = match classify(&shared.config, &token, result) {
            Ok(response) => {
                tracing::trace!(attempt = number, status = %response.status(), "succeeded");
                return orphan.finish(Ok(response));
            }
            Err(error) => error,
        };

        let next = match shared.lock().get_mut(&key) {
            Some(entry) => after_failure(entry, error, number),
            None => return orphan.disarm(),
        };
        let (hooks, notice, delay, abort) = match next {
            Next::Finish(error) => return orphan.finish(Err(error)),
            Next::Retry {
                hooks,
                notice,
                delay,
                abort,
            } => (hooks, notice, delay, abort),
        };

        tracing::debug!(
            attempt = number,
            retries_remaining = notice.retries_remaining,
            error = %notice.error,
            ?delay,
            "retrying"
        );
        hooks.notify(&notice);

        if delay > Duration::from_secs(0) {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = abort.aborted() => {}
            }
        }
    }
}

/// Turns the settlement of one attempt into its outcome.
///
/// An abort overrides every failure, including ones the transport reported
/// for unrelated reasons. A success that lands after an abort is still a
/// success.
fn classify(
    config: &Config,
    token: &CancellationToken,
    result: Result<http::Response<Bytes>, BoxError>,
) -> Outcome {
    let abort = token.abort_source();
    match result {
        Ok(response) => {
            let response = config.on_response(response);
            match Classification::of_status(response.status()) {
                None => Ok(Arc::new(response)),
                Some(_) if abort.is_aborted() => Err(Error::aborted(abort.reason(), None)),
                Some(kind) => Err(Error::from_status(kind, Arc::new(response))),
            }
        }
        Err(source) => {
            if abort.is_aborted() {
                Err(Error::aborted(abort.reason(), Some(source)))
            } else if token.cancelled_by() == Some(CancelledBy::Timeout) {
                Err(Error::transport(Classification::TimedOut, source))
            } else {
                let kind = Classification::of_transport_error(&*source);
                Err(Error::transport(kind, source))
            }
        }
    }
}

// ===== impl Orphan =====

impl<T> Orphan<T> {
    fn new(shared: Arc<Shared<T>>, key: RequestKey) -> Self {
        Orphan {
            shared,
            key,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Removes the entry and notifies its waiters, outside the lock.
    fn finish(mut self, outcome: Outcome) {
        self.armed = false;
        let entry = self.shared.lock().remove(&self.key);
        if let Some(entry) = entry {
            settle(entry, outcome);
        }
    }
}

impl<T> Drop for Orphan<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let entry = self.shared.lock().remove(&self.key);
        if let Some(entry) = entry {
            tracing::warn!(key = %self.key, "in-flight request dropped before settling");
            settle(entry, Err(Error::closed()));
        }
    }
}

fn settle(entry: Entry, outcome: Outcome) {
    match outcome {
        Ok(response) => {
            tracing::debug!(
                waiters = entry.waiters.len(),
                attempts = entry.attempts,
                "settled"
            );
            for waiter in entry.waiters {
                waiter.succeed(&response);
            }
        }
        Err(error) => {
            tracing::debug!(
                waiters = entry.waiters.len(),
                attempts = entry.attempts,
                %error,
                "failed"
            );
            for waiter in entry.waiters {
                waiter.fail(&error);
            }
        }
    }
}
