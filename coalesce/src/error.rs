//! Error types

use crate::Response;
use http::StatusCode;
use std::{error, fmt, sync::Arc};

/// The type-erased error a transport may fail with.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// The category assigned to a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The entry was explicitly aborted.
    Aborted,
    /// The attempt's timeout elapsed.
    TimedOut,
    /// No response was obtained, for a reason other than a timeout.
    Network,
    /// The server answered with a `4xx` status.
    ClientStatus(StatusCode),
    /// The server answered with a `5xx` status.
    ServerStatus(StatusCode),
    /// Anything that could not be classified.
    Unknown,
}

/// The error delivered to every waiter of a failed request.
///
/// Cloning is cheap; all waiters of one entry receive clones of the same
/// error.
#[derive(Clone)]
pub struct Error {
    inner: Arc<Inner>,
}

struct Inner {
    kind: Classification,
    reason: Option<String>,
    response: Option<Response>,
    source: Option<BoxError>,
}

/// A transport failed before obtaining a response.
///
/// Transports wrap connection-level failures in this type so they classify
/// as [`Classification::Network`]. `std::io::Error`s are recognized as well.
#[derive(Debug)]
pub struct Network {
    inner: BoxError,
}

/// A transport stopped because its [`CancellationToken`] fired.
///
/// [`CancellationToken`]: crate::CancellationToken
#[derive(Debug, Default)]
pub struct Cancelled {
    _p: (),
}

// ===== impl Classification =====

impl Classification {
    /// Classifies a response status. Success statuses yield `None`.
    pub fn of_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            None
        } else if status.is_client_error() {
            Some(Classification::ClientStatus(status))
        } else if status.is_server_error() {
            Some(Classification::ServerStatus(status))
        } else {
            Some(Classification::Unknown)
        }
    }

    /// Classifies a transport error, ignoring cancellation provenance.
    pub fn of_transport_error(error: &(dyn error::Error + 'static)) -> Self {
        let mut cause = Some(error);
        while let Some(err) = cause {
            if err.is::<Network>() || err.is::<std::io::Error>() {
                return Classification::Network;
            }
            cause = err.source();
        }
        Classification::Unknown
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Aborted => f.pad("aborted"),
            Classification::TimedOut => f.pad("timed out"),
            Classification::Network => f.pad("network error"),
            Classification::ClientStatus(status) => write!(f, "client error ({})", status),
            Classification::ServerStatus(status) => write!(f, "server error ({})", status),
            Classification::Unknown => f.pad("unknown error"),
        }
    }
}

// ===== impl Error =====

impl Error {
    pub(crate) fn new(
        kind: Classification,
        reason: Option<String>,
        response: Option<Response>,
        source: Option<BoxError>,
    ) -> Self {
        Error {
            inner: Arc::new(Inner {
                kind,
                reason,
                response,
                source,
            }),
        }
    }

    pub(crate) fn aborted(reason: Option<String>, source: Option<BoxError>) -> Self {
        Error::new(Classification::Aborted, reason, None, source)
    }

    pub(crate) fn from_status(kind: Classification, response: Response) -> Self {
        Error::new(kind, None, Some(response), None)
    }

    pub(crate) fn transport(kind: Classification, source: BoxError) -> Self {
        Error::new(kind, None, None, Some(source))
    }

    /// The notifier of an in-flight request vanished before settling it.
    pub(crate) fn closed() -> Self {
        Error::new(
            Classification::Unknown,
            Some("in-flight request closed".to_owned()),
            None,
            None,
        )
    }

    /// The classification of the failure.
    pub fn kind(&self) -> Classification {
        self.inner.kind
    }

    /// Whether the request was explicitly aborted.
    pub fn is_aborted(&self) -> bool {
        self.inner.kind == Classification::Aborted
    }

    /// Whether the last attempt timed out.
    pub fn is_timeout(&self) -> bool {
        self.inner.kind == Classification::TimedOut
    }

    /// The response status, for status failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self.inner.kind {
            Classification::ClientStatus(status) | Classification::ServerStatus(status) => {
                Some(status)
            }
            _ => self.inner.response.as_ref().map(|r| r.status()),
        }
    }

    /// The response that caused a status failure.
    pub fn response(&self) -> Option<&Response> {
        self.inner.response.as_ref()
    }

    /// The reason passed when aborting, if any.
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.as_deref()
    }

    /// Whether both errors are the same fanned-out value.
    pub fn ptr_eq(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.inner.kind)
            .field("reason", &self.inner.reason)
            .field("status", &self.inner.response.as_ref().map(|r| r.status()))
            .field("source", &self.inner.source)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request {}", self.inner.kind)?;
        if let Some(ref reason) = self.inner.reason {
            write!(f, ": {}", reason)?;
        } else if let Some(ref source) = self.inner.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn error::Error + 'static))
    }
}

// ===== impl Network =====

impl Network {
    /// Wraps a connection-level failure.
    pub fn new(inner: impl Into<BoxError>) -> Self {
        Network {
            inner: inner.into(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network failure: {}", self.inner)
    }
}

impl error::Error for Network {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&*self.inner)
    }
}

// ===== impl Cancelled =====

impl Cancelled {
    /// Creates a new `Cancelled` error.
    pub fn new() -> Self {
        Cancelled { _p: () }
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("operation cancelled")
    }
}

impl error::Error for Cancelled {}
