//! The transport seam.
//!
//! A transport is any [`Service`] that accepts an [`Attempt`] and yields an
//! `http::Response<Bytes>`. The client clones the transport for every physical
//! attempt, waits for it to become ready and calls it once.

use crate::cancel::CancellationToken;
use crate::descriptor::Descriptor;
use crate::error::BoxError;
use bytes::Bytes;
use futures_util::future::poll_fn;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;

/// One physical attempt at performing a request.
#[derive(Clone, Debug)]
pub struct Attempt {
    descriptor: Arc<Descriptor>,
    token: CancellationToken,
    number: u32,
}

impl Attempt {
    pub(crate) fn new(descriptor: Arc<Descriptor>, token: CancellationToken, number: u32) -> Self {
        Attempt {
            descriptor,
            token,
            number,
        }
    }

    /// The request to perform.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Fires when the transport should stop.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The 1-based attempt number within its entry.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Builds an `http::Request` from the descriptor.
    pub fn to_request(&self) -> http::Request<Bytes> {
        self.descriptor.to_request()
    }
}

/// Returns a new [`TransportFn`] with the given closure.
pub fn transport_fn<T>(f: T) -> TransportFn<T> {
    TransportFn { f }
}

/// A transport implemented by a closure.
#[derive(Copy, Clone, Debug)]
pub struct TransportFn<T> {
    f: T,
}

impl<T, F, E> Service<Attempt> for TransportFn<T>
where
    T: FnMut(Attempt) -> F,
    F: Future<Output = Result<http::Response<Bytes>, E>>,
{
    type Response = http::Response<Bytes>;
    type Error = E;
    type Future = F;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), E>> {
        Ok(()).into()
    }

    fn call(&mut self, attempt: Attempt) -> Self::Future {
        (self.f)(attempt)
    }
}

/// Drives one attempt through `transport`: readiness first, then the call.
pub(crate) async fn call<T>(mut transport: T, attempt: Attempt) -> Result<http::Response<Bytes>, BoxError>
where
    T: Service<Attempt, Response = http::Response<Bytes>>,
    T::Error: Into<BoxError>,
{
    poll_fn(|cx| transport.poll_ready(cx))
        .await
        .map_err(Into::into)?;
    transport.call(attempt).await.map_err(Into::into)
}
