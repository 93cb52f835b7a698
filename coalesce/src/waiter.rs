//! Waiters: one logical caller's subscription to a physical transfer.

use crate::error::{Classification, Error};
use crate::key::RequestKey;
use crate::options::{Callbacks, RetryNotice};
use crate::Response;
use futures_core::ready;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Identifies one waiter; used to abort or inspect the transfer it waits on
/// without knowing the request key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) u64);

/// Names an in-flight entry, either by one of its waiters or by its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// The entry a waiter is attached to.
    Handle(Handle),
    /// The entry for a request key.
    Key(RequestKey),
}

pub(crate) type Outcome = Result<Response, Error>;

pin_project! {
    /// Resolves with the outcome of the shared transfer.
    #[derive(Debug)]
    pub struct ResponseFuture {
        handle: Handle,
        key: RequestKey,
        #[pin]
        rx: oneshot::Receiver<Outcome>,
    }
}

/// The notifying half of a waiter, owned by the in-flight entry.
pub(crate) struct Waiter {
    handle: Handle,
    tx: oneshot::Sender<Outcome>,
    callbacks: Callbacks,
}

/// Retry hooks collected so they can run outside the registry lock.
pub(crate) struct RetryHooks(Vec<Callbacks>);

// ===== impl ResponseFuture =====

impl ResponseFuture {
    pub(crate) fn new(handle: Handle, key: RequestKey, rx: oneshot::Receiver<Outcome>) -> Self {
        ResponseFuture { handle, key, rx }
    }

    /// This waiter's handle.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The key of the request this waiter is attached to.
    pub fn key(&self) -> RequestKey {
        self.key
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.project().rx.poll(cx)) {
            Ok(outcome) => Poll::Ready(outcome),
            Err(_) => Poll::Ready(Err(Error::closed())),
        }
    }
}

// ===== impl Waiter =====

impl Waiter {
    pub(crate) fn new(handle: Handle, callbacks: Callbacks) -> (Waiter, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Waiter {
                handle,
                tx,
                callbacks,
            },
            rx,
        )
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn retry_hook(&self) -> Option<Callbacks> {
        self.callbacks
            .on_retry
            .as_ref()
            .map(|_| self.callbacks.clone())
    }

    pub(crate) fn succeed(self, response: &Response) {
        // The caller may have dropped its future; hooks still run.
        let _ = self.tx.send(Ok(response.clone()));
        if let Some(ref on_success) = self.callbacks.on_success {
            on_success(response);
        }
    }

    pub(crate) fn fail(self, error: &Error) {
        let _ = self.tx.send(Err(error.clone()));

        let specific = match error.kind() {
            Classification::Aborted => self.callbacks.on_abort.as_ref(),
            Classification::TimedOut => self.callbacks.on_timeout.as_ref(),
            Classification::ClientStatus(_) => self.callbacks.on_client_error.as_ref(),
            Classification::ServerStatus(_) => self.callbacks.on_server_error.as_ref(),
            Classification::Network | Classification::Unknown => None,
        };
        if let Some(hook) = specific {
            hook(error);
        }
        if let Some(ref on_error) = self.callbacks.on_error {
            on_error(error);
        }
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("handle", &self.handle)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

// ===== impl RetryHooks =====

impl RetryHooks {
    pub(crate) fn collect<'a>(waiters: impl Iterator<Item = &'a Waiter>) -> Self {
        RetryHooks(waiters.filter_map(Waiter::retry_hook).collect())
    }

    pub(crate) fn notify(&self, notice: &RetryNotice) {
        for callbacks in &self.0 {
            if let Some(ref on_retry) = callbacks.on_retry {
                on_retry(notice);
            }
        }
    }
}

// ===== impl Target =====

impl From<Handle> for Target {
    fn from(handle: Handle) -> Self {
        Target::Handle(handle)
    }
}

impl From<&Handle> for Target {
    fn from(handle: &Handle) -> Self {
        Target::Handle(*handle)
    }
}

impl From<RequestKey> for Target {
    fn from(key: RequestKey) -> Self {
        Target::Key(key)
    }
}

impl From<&RequestKey> for Target {
    fn from(key: &RequestKey) -> Self {
        Target::Key(*key)
    }
}

impl From<&ResponseFuture> for Target {
    fn from(future: &ResponseFuture) -> Self {
        Target::Handle(future.handle)
    }
}
