//! Error handling module
//!
//! This module defines the error types and result type aliases used by the
//! connection wrappers, the seekable readers and the multiplexer binary.

use std::io;
use thiserror::Error;

/// Conn Tease error type
#[derive(Error, Debug)]
pub enum TeaseError {
    /// `replay()` or `set_new_conn()` on a connection that is already piped
    #[error("tease: connection already in pipe mode")]
    AlreadyPiped,

    /// Server-side buffered read after a buffered write, with no pipe in between
    #[error("tease: cannot read after write without pipe mode")]
    ReadAfterWrite,

    /// Buffered input or output would grow past the configured ceiling
    #[error("tease: request exceeded max buffer of {limit} bytes, closing connection")]
    BufferExceeded {
        /// The ceiling that was hit
        limit: usize,
    },

    /// `close()` during detection
    #[error("tease: invalid use of closed connection")]
    ClosedBeforePipe,

    /// Seek below the current position of a forward-only reader
    #[error("tease: cannot move backward from {position} to {target}")]
    BackwardSeek {
        /// Position of the reader when the seek was requested
        position: u64,
        /// Requested absolute position
        target: u64,
    },

    /// Seek that the reader cannot express (from end, or before offset zero)
    #[error("tease: unsupported seek: {0}")]
    UnsupportedSeek(&'static str),

    /// Use of a replay reader after `close()`
    #[error("tease: reader is closed")]
    ReaderClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol detection error
    #[error("Detection error: {0}")]
    Detection(String),
}

impl TeaseError {
    /// Recover a `TeaseError` carried inside an `io::Error`.
    ///
    /// The `Read`/`Write`/`Seek` implementations of this crate have to return
    /// `io::Error`; the original kind stays reachable through this helper.
    pub fn from_io(err: &io::Error) -> Option<&TeaseError> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<TeaseError>())
    }

    /// Whether the error leaves the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TeaseError::ReadAfterWrite | TeaseError::BufferExceeded { .. }
        )
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            TeaseError::BufferExceeded { .. } => io::ErrorKind::OutOfMemory,
            TeaseError::ClosedBeforePipe | TeaseError::ReaderClosed => io::ErrorKind::NotConnected,
            TeaseError::UnsupportedSeek(_) => io::ErrorKind::Unsupported,
            TeaseError::AlreadyPiped
            | TeaseError::ReadAfterWrite
            | TeaseError::BackwardSeek { .. } => io::ErrorKind::InvalidInput,
            TeaseError::Io(e) => e.kind(),
            TeaseError::Config(_) | TeaseError::Detection(_) => io::ErrorKind::Other,
        }
    }
}

impl From<TeaseError> for io::Error {
    fn from(err: TeaseError) -> Self {
        match err {
            TeaseError::Io(e) => e,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

impl From<io::Error> for TeaseError {
    /// Unwraps a `TeaseError` that travelled through an `io::Error`.
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<TeaseError>()) {
            return TeaseError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<TeaseError>()) {
            Some(Ok(tease)) => *tease,
            _ => TeaseError::Io(io::Error::from(kind)),
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `TeaseError`.
pub type Result<T> = std::result::Result<T, TeaseError>;
