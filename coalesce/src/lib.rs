#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! `coalesce` coordinates HTTP requests issued through a pluggable transport.
//!
//! A [`Client`] sits above a raw transport (any [`Service`] accepting an
//! [`Attempt`]) and
//!
//! - collapses logically identical concurrent requests into a single physical
//!   transfer, keyed by a [`RequestKey`] derived from the request's method,
//!   normalized URI, body and dedup-relevant headers;
//! - fans the single result out to every caller that asked for it;
//! - distinguishes an explicit abort from a timeout, even when the transport
//!   only reports a generic cancellation;
//! - retries failed transfers according to a [`RetryPolicy`], notifying every
//!   attached caller of each retry without them re-issuing the request.
//!
//! ```
//! use bytes::Bytes;
//! use coalesce::{transport_fn, Attempt, BoxError, Client, Descriptor, RequestOptions};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), coalesce::Error> {
//! let transport = transport_fn(|_attempt: Attempt| async {
//!     Ok::<_, BoxError>(http::Response::new(Bytes::from_static(b"hello")))
//! });
//!
//! let client = Client::builder()
//!     .timeout(Duration::from_secs(3))
//!     .retry(2)
//!     .build(transport);
//!
//! let descriptor = Descriptor::get("https://api.example.com/items".parse().unwrap());
//! let first = client.request(descriptor.clone(), RequestOptions::new());
//! let second = client.request(descriptor, RequestOptions::new());
//!
//! // Both callers share one physical transfer.
//! let (first, second) = (first.await?, second.await?);
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//! # Ok(())
//! # }
//! ```
//!
//! [`Service`]: tower_service::Service

pub mod builder;
pub mod cancel;
pub mod descriptor;
pub mod error;
pub mod key;
pub mod middleware;
pub mod options;
pub mod retry;
pub mod transport;
pub mod waiter;

mod client;
mod registry;

pub use crate::builder::ClientBuilder;
pub use crate::cancel::{AbortSource, CancellationToken, CancelledBy};
pub use crate::client::Client;
pub use crate::descriptor::Descriptor;
pub use crate::error::{BoxError, Classification, Error};
pub use crate::key::{KeyHeaders, RequestKey};
pub use crate::middleware::Middleware;
pub use crate::options::{RequestOptions, RetryNotice};
pub use crate::registry::{InFlight, Phase};
pub use crate::retry::{Backoff, ExponentialBackoff, RetryPolicy};
pub use crate::transport::{transport_fn, Attempt, TransportFn};
pub use crate::waiter::{Handle, ResponseFuture, Target};

/// The response value shared by every waiter of a physical transfer.
pub type Response = std::sync::Arc<http::Response<bytes::Bytes>>;
