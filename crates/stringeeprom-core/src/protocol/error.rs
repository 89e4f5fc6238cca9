//! Protocol errors

use thiserror::Error;

/// Errors from the serial link itself
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Port unavailable: {0}")]
    PortUnavailable(String),

    #[error("Invalid connection parameters: {0}")]
    InvalidParameters(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("Port closed")]
    PortClosed,
}

/// Errors from decoding a device reply line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed size announcement: {0:?}")]
    MalformedSize(String),

    #[error("Malformed entry read: {0:?}")]
    MalformedEntry(String),

    #[error("Position {position} outside table of size {size}")]
    OutOfRange { position: usize, size: usize },
}

/// Errors from session-level operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl LinkError {
    /// Classify an I/O error from an open port.
    ///
    /// A vanished USB device surfaces as `BrokenPipe`/`NotFound` on most
    /// platforms; everything else is a generic I/O failure.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::BrokenPipe | ErrorKind::NotFound | ErrorKind::NotConnected => {
                LinkError::PortClosed
            }
            _ => LinkError::IoFailure(err.to_string()),
        }
    }
}
