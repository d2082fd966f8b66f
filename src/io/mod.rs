//! Seekable readers over forward-only byte sources
//!
//! Sockets and pipes cannot rewind. The readers in this module make them look
//! seekable for as long as a caller is still deciding what it is looking at:
//!
//! - [`TeeReader`] mirrors every byte it reads into a capture sink.
//! - [`ForwardMultiReader`] concatenates sources and seeks forward by discarding.
//! - [`ReplayReader`] combines the two: random access over everything read so
//!   far, then a one-way [`ReplayReader::commit`] into a plain forward stream.

mod multi;
mod replay;
mod seek;
mod tee;

pub use multi::ForwardMultiReader;
pub use replay::ReplayReader;
pub use tee::TeeReader;
