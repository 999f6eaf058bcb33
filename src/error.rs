//! Error types.

use std::any::Any;
use std::fmt;

/// [`Error`] types returned by mutating operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// InvalidArgument: an argument is out of range or absent.
    InvalidArgument(&'static str),
    /// Redistribution: resizing a segment failed.
    ///
    /// The mutation that triggered the resize has already been applied when this error is
    /// returned; only the resize was skipped.
    Redistribution(String),
}

impl Error {
    /// Converts a panic payload caught while resizing into an [`Error::Redistribution`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("unknown panic")
        };
        Self::Redistribution(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
            Self::Redistribution(reason) => write!(f, "pair redistribution failed: {reason}"),
        }
    }
}

impl std::error::Error for Error {}
