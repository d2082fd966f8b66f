//! Network utility functions
//!
//! Address parsing shared by the configuration layer and the multiplexer.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use super::error::{TeaseError, Result};

/// Parse a socket address, resolving host names when needed
///
/// Backend addresses in the multiplexer configuration go through here, so
/// `localhost:8080` works as well as `127.0.0.1:8080`.
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    addr.to_socket_addrs()
        .map_err(|e| TeaseError::Config(format!("Failed to parse address {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| TeaseError::Config(format!("Address {} did not resolve", addr)))
}
