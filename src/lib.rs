//! Conn Tease: protocol detection over live connections
//!
//! Wrap a connection, let detectors read (and write) through it, rewind
//! between attempts, and hand the connection over once a protocol is
//! recognised. The bytes a detector consumed are not lost: after
//! [`Tease::pipe`](conn::Tease::pipe) the next reader still sees them.
//!
//! # Main Features
//!
//! - [`Server`] and [`Client`] connection wrappers with replay and pipe
//! - [`TeeReader`], [`ForwardMultiReader`] and [`ReplayReader`] for sniffing
//!   plain byte sources
//! - Pluggable [`ProtocolDetector`]s driven by a [`Sniffer`]
//! - A multiplexer ([`mux::Mux`]) routing TLS and HTTP on one port
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpListener;
//! use conn_tease::{Result, Server, Sniffer};
//!
//! fn main() -> Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:7443")?;
//!     let (stream, _) = listener.accept()?;
//!
//!     let server = Server::new(stream);
//!     match Sniffer::standard().sniff(&server)? {
//!         Some(info) => println!("detected {}", info),
//!         None => server.pipe()?,
//!     }
//!     // `&server` now reads and writes like the raw stream.
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod conn;
pub mod io;
pub mod mux;
pub mod protocol;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, Result, TeaseError};
pub use config::TeaseConfig;
pub use conn::{Client, Conn, Server};
pub use io::{ForwardMultiReader, ReplayReader, TeeReader};
pub use protocol::{DetectionResult, ProtocolDetector, ProtocolInfo, Sniffer};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
