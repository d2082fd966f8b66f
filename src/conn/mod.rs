//! Connection wrappers for protocol detection
//!
//! A [`Server`] or [`Client`] wraps a duplex byte stream (anything
//! implementing [`Conn`]) and lets detectors read and write through it without
//! committing the stream to a protocol. Once a detector is satisfied,
//! [`Tease::pipe`] flattens the wrapper into a passthrough; if it is not,
//! [`Tease::replay`] rewinds so the next detector sees the same bytes.
//!
//! The two variants share one state machine and differ only in their
//! [`Direction`]: a server retains input and holds back output, a client
//! forwards output at once and keeps a copy so it can be sent again over a
//! replacement connection ([`Client::set_new_conn`](Tease::set_new_conn)).

mod direction;
mod state;
mod tease;

pub use direction::{ClientSide, Direction, ServerSide};
pub use state::{Fault, Mode};
pub use tease::{Client, Server, Tease};

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// A duplex byte stream shaped like a socket.
///
/// Every method takes `&self` so that one reader thread and one writer
/// thread can share the stream, as with `&TcpStream`.
#[cfg_attr(test, mockall::automock)]
pub trait Conn {
    /// Read into `buf`, blocking until at least one byte, end of stream or an error.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some prefix of `buf`.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Close both directions. Blocked reads and writes return.
    fn close(&self) -> io::Result<()>;

    /// Local address of the stream.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Remote address of the stream.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Timeout for blocking reads; `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Timeout for blocking writes; `None` blocks indefinitely.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Set both timeouts at once.
    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

/// Write all of `buf` to `conn`.
pub fn write_all<C: Conn + ?Sized>(conn: &C, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match conn.write(buf) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl Conn for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream: &TcpStream = self;
        Read::read(&mut stream, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stream: &TcpStream = self;
        Write::write(&mut stream, buf)
    }

    fn close(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            // Already shut down by us or reset by the peer.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}
