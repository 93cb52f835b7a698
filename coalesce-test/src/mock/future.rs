//! Future types

use crate::mock::error::{self, Error};
use bytes::Bytes;
use coalesce::error::Cancelled;
use coalesce::CancellationToken;
use futures_util::future::BoxFuture;
use futures_util::ready;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;

use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

pin_project! {
    /// Future of the `Mock` response.
    ///
    /// Resolves with whatever the test sends through the matching
    /// [`SendResponse`](super::SendResponse), or with [`Cancelled`] once the
    /// attempt's token fires, whichever comes first.
    pub struct ResponseFuture {
        #[pin]
        rx: Option<Rx>,
        cancelled: Option<BoxFuture<'static, ()>>,
    }
}

type Rx = oneshot::Receiver<Result<http::Response<Bytes>, Error>>;

impl ResponseFuture {
    pub(crate) fn new(rx: Rx, token: CancellationToken) -> ResponseFuture {
        ResponseFuture {
            rx: Some(rx),
            cancelled: Some(Box::pin(async move { token.cancelled().await })),
        }
    }

    pub(crate) fn closed() -> ResponseFuture {
        ResponseFuture {
            rx: None,
            cancelled: None,
        }
    }
}

impl Future for ResponseFuture {
    type Output = Result<http::Response<Bytes>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let rx = match this.rx.as_pin_mut() {
            Some(rx) => rx,
            None => return Poll::Ready(Err(error::Closed::Handle.into())),
        };

        if let Poll::Ready(result) = rx.poll(cx) {
            return match result {
                Ok(r) => Poll::Ready(r),
                Err(_) => Poll::Ready(Err(error::Closed::Unanswered.into())),
            };
        }

        if let Some(cancelled) = this.cancelled.as_mut() {
            ready!(cancelled.as_mut().poll(cx));
            return Poll::Ready(Err(Cancelled::new().into()));
        }

        Poll::Pending
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("closed", &self.rx.is_none())
            .finish()
    }
}
