//! Errors the mock transport fails attempts with.

use std::{error, fmt};

pub(crate) type Error = coalesce::BoxError;

/// An attempt the mock could not hand to a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// The [`Handle`](super::Handle) was dropped, so nothing receives
    /// attempts anymore.
    Handle,
    /// The attempt's [`SendResponse`](super::SendResponse) was dropped
    /// without answering.
    Unanswered,
}

impl fmt::Display for Closed {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Closed::Handle => fmt.write_str("mock handle dropped"),
            Closed::Unanswered => fmt.write_str("attempt dropped without a response"),
        }
    }
}

impl error::Error for Closed {}
