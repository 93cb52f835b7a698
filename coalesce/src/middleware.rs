//! Request and response middleware.
//!
//! Middleware runs in the order it was added to the
//! [`ClientBuilder`](crate::ClientBuilder). `on_request` transforms the
//! descriptor before its [`RequestKey`](crate::RequestKey) is derived, so the
//! key reflects what is actually sent; retries reuse the transformed
//! descriptor rather than running the chain again.

use crate::descriptor::Descriptor;
use bytes::Bytes;

/// Transforms requests before they are keyed and responses before they are
/// classified.
///
/// # Closure
///
/// This trait provides a blanket implementation for closures of the type
/// `Fn(Descriptor) -> Descriptor + Send + Sync + 'static`, which transform
/// requests only.
pub trait Middleware: Send + Sync + 'static {
    /// Transforms an outgoing request.
    fn on_request(&self, descriptor: Descriptor) -> Descriptor {
        descriptor
    }

    /// Transforms a response the transport returned, before its status is
    /// classified.
    fn on_response(&self, response: http::Response<Bytes>) -> http::Response<Bytes> {
        response
    }
}

impl<F> Middleware for F
where
    F: Fn(Descriptor) -> Descriptor + Send + Sync + 'static,
{
    fn on_request(&self, descriptor: Descriptor) -> Descriptor {
        (self)(descriptor)
    }
}
