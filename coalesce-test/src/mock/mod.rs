//! Mock transport that can be used in tests.
//!
//! Every call the [`Mock`] receives is handed to the paired [`Handle`] along
//! with a [`SendResponse`], so a test decides how, and when, each physical
//! attempt settles.

pub mod error;
pub mod future;

use crate::mock::{error::Error, future::ResponseFuture};
use bytes::Bytes;
use coalesce::Attempt;
use http::StatusCode;
use tokio::sync::{mpsc, oneshot};
use tower_service::Service;

use std::{
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

/// A mock transport.
#[derive(Clone, Debug)]
pub struct Mock {
    tx: Tx,
    state: Arc<Mutex<State>>,
}

/// Handle to the `Mock`.
#[derive(Debug)]
pub struct Handle {
    rx: Rx,
    state: Arc<Mutex<State>>,
}

type Request = (Attempt, SendResponse);

/// Send a response in reply to a received attempt.
#[derive(Debug)]
pub struct SendResponse {
    tx: oneshot::Sender<Result<http::Response<Bytes>, Error>>,
}

#[derive(Debug)]
struct State {
    /// Number of attempts the mock was called with
    calls: usize,

    /// Tracks if the `Handle` dropped
    is_closed: bool,
}

type Tx = mpsc::UnboundedSender<Request>;
type Rx = mpsc::UnboundedReceiver<Request>;

/// Create a new `Mock` and `Handle` pair.
pub fn pair() -> (Mock, Handle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(State::new()));

    let mock = Mock {
        tx,
        state: state.clone(),
    };

    let handle = Handle { rx, state };

    (mock, handle)
}

impl Service<Attempt> for Mock {
    type Response = http::Response<Bytes>;
    type Error = Error;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let state = self.state.lock().unwrap();

        if state.is_closed {
            return Poll::Ready(Err(error::Closed::Handle.into()));
        }

        Poll::Ready(Ok(()))
    }

    fn call(&mut self, attempt: Attempt) -> Self::Future {
        let mut state = self.state.lock().unwrap();

        if state.is_closed {
            return ResponseFuture::closed();
        }

        state.calls += 1;

        let token = attempt.token().clone();
        let (tx, rx) = oneshot::channel();
        let send_response = SendResponse { tx };

        match self.tx.send((attempt, send_response)) {
            Ok(_) => {}
            Err(_) => return ResponseFuture::closed(),
        }

        ResponseFuture::new(rx, token)
    }
}

// ===== impl Handle =====

impl Handle {
    /// Gets the next attempt.
    pub async fn next_request(&mut self) -> Option<Request> {
        self.rx.recv().await
    }

    /// Gets the next attempt if one was already sent.
    pub fn try_next_request(&mut self) -> Option<Request> {
        self.rx.try_recv().ok()
    }

    /// The number of attempts the mock has been called with.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(v) => v,
            Err(e) => {
                if ::std::thread::panicking() {
                    return;
                }

                panic!("{:?}", e);
            }
        };

        state.is_closed = true;
    }
}

// ===== impl SendResponse =====

impl SendResponse {
    /// Resolve the pending attempt with the given response.
    pub fn send_response(self, response: http::Response<Bytes>) {
        // The attempt may have been cancelled and dropped already.
        let _ = self.tx.send(Ok(response));
    }

    /// Resolve the pending attempt with a response of the given status and
    /// body.
    ///
    /// # Panics
    ///
    /// Panics if `status` is not a valid status code.
    pub fn respond(self, status: u16, body: impl Into<Bytes>) {
        let mut response = http::Response::new(body.into());
        *response.status_mut() = StatusCode::from_u16(status).expect("invalid status code");
        self.send_response(response);
    }

    /// Resolve the pending attempt with the given error.
    pub fn send_error<E: Into<Error>>(self, err: E) {
        let _ = self.tx.send(Err(err.into()));
    }
}

// ===== impl State =====

impl State {
    fn new() -> State {
        State {
            calls: 0,
            is_closed: false,
        }
    }
}
