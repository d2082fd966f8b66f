//! Wrapper modes.

use std::fmt;

use crate::common::TeaseError;

/// Why a detecting connection stopped accepting operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A server read came after a buffered write.
    ReadAfterWrite,
    /// Buffered input or output would have passed the ceiling.
    BufferExceeded,
    /// `close()` was called before piping. `replay()` clears it.
    Closed,
}

impl Fault {
    /// The error reported for this fault. `limit` is the wrapper's max buffer.
    pub fn to_error(self, limit: usize) -> TeaseError {
        match self {
            Fault::ReadAfterWrite => TeaseError::ReadAfterWrite,
            Fault::BufferExceeded => TeaseError::BufferExceeded { limit },
            Fault::Closed => TeaseError::ClosedBeforePipe,
        }
    }

    /// Faults that also shut the underlying stream.
    pub fn closes_stream(self) -> bool {
        !matches!(self, Fault::Closed)
    }
}

/// Where a wrapper is in its life.
///
/// `Detecting` moves to `Piped` exactly once. `Faulted(Closed)` can go back to
/// `Detecting` through `replay()`; other faults are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Detecting,
    Piped,
    Faulted(Fault),
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Detecting => write!(f, "detecting"),
            Mode::Piped => write!(f, "piped"),
            Mode::Faulted(fault) => write!(f, "faulted({:?})", fault),
        }
    }
}
