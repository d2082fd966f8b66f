//! Protocol detection module
//!
//! Detectors look at the first bytes of a connection through a
//! [`Server`](crate::conn::Server) wrapper. The [`Sniffer`] runs them in
//! order, rewinding the wrapper between attempts so that every detector sees
//! the connection from its first byte, and pipes the wrapper on the first
//! match.
//!
//! Detectors only recognise a protocol; they never parse it.

mod detector;
mod prefix;
mod sniffer;

pub use detector::{read_up_to, DetectionResult, ProtocolDetector, ProtocolInfo, TlsDetector};
pub use prefix::PrefixDetector;
pub use sniffer::Sniffer;
