//! Data forwarding module
//!
//! This module relays bytes between a piped client wrapper and a backend
//! stream, one thread per direction.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;

use log::debug;

use crate::config::defaults;
use crate::conn::{Conn, Server};

/// Copy `from` into `to` until end of stream or the first error.
///
/// Returns the number of bytes written to `to`.
fn pump(mut from: impl Read, mut to: impl Write, direction: &str) -> u64 {
    let mut buffer = vec![0u8; defaults::RELAY_BUFFER];
    let mut total_bytes = 0u64;

    loop {
        match from.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = to.write_all(&buffer[..n]) {
                    debug!("{}: write failed: {}", direction, e);
                    break;
                }
                total_bytes += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("{}: read failed: {}", direction, e);
                break;
            }
        }
    }

    debug!("{} transferred {} bytes total", direction, total_bytes);
    total_bytes
}

/// Forward data between a piped client and its backend
///
/// Client end of stream is passed on as a write shutdown of the backend, so
/// the backend can still answer. Backend end of stream closes both streams.
///
/// # Parameters
///
/// * `client` - Piped client wrapper
/// * `backend` - Backend TCP stream
///
/// # Returns
///
/// Returns the bytes relayed upstream (client to backend) and downstream.
pub fn proxy_data<S>(client: &Server<S>, backend: &TcpStream) -> (u64, u64)
where
    S: Conn + Sync,
{
    thread::scope(|scope| {
        let upstream = scope.spawn(move || {
            let copied = pump(client, backend, "client to backend");
            if let Err(e) = backend.shutdown(Shutdown::Write) {
                debug!("Backend write shutdown: {}", e);
            }
            copied
        });

        let downstream = pump(backend, client, "backend to client");

        // Unblock the upstream reader if the client is still connected.
        if let Err(e) = Conn::close(client) {
            debug!("Client close: {}", e);
        }
        if let Err(e) = backend.shutdown(Shutdown::Both) {
            debug!("Backend shutdown: {}", e);
        }

        let upstream = upstream.join().unwrap_or_else(|_| {
            debug!("Upstream relay thread panicked");
            0
        });
        (upstream, downstream)
    })
}
