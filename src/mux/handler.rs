//! Connection handler module
//!
//! This module handles individual client connections: sniff, pick a
//! backend, connect, relay.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info, warn};

use super::forwarder::proxy_data;
use super::metrics;
use crate::common::{Result, TeaseError};
use crate::config::MuxConfig;
use crate::conn::{Conn, Server};
use crate::protocol::{ProtocolInfo, Sniffer};

/// Where a connection is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// TLS backend
    Tls,
    /// HTTP backend (the fallback unless configured)
    Http,
    /// Anything no detector claimed, or claimed by a detector without a route
    Fallback,
}

impl Route {
    /// Route for a detected protocol
    pub fn for_protocol(info: Option<&ProtocolInfo>) -> Self {
        match info.map(|i| i.name.as_str()) {
            Some("TLS") => Route::Tls,
            Some("HTTP") => Route::Http,
            _ => Route::Fallback,
        }
    }

    /// Backend address for this route
    pub fn target<'a>(&self, config: &'a MuxConfig) -> &'a str {
        match self {
            Route::Tls => &config.tls_target,
            Route::Http => config.http_or_fallback(),
            Route::Fallback => &config.fallback_target,
        }
    }

    /// Label used in metrics
    pub fn label(&self) -> &'static str {
        match self {
            Route::Tls => "tls",
            Route::Http => "http",
            Route::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Connect to `target`, trying each resolved address in turn.
pub fn connect_backend(target: &str, timeout: Duration) -> Result<TcpStream> {
    let mut last_error = None;

    for addr in target.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connecting to {} ({}) failed: {}", target, addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => TeaseError::Io(e),
        None => TeaseError::Config(format!("{} resolved to no addresses", target)),
    })
}

/// Handle a single client connection
///
/// Blocks until the relay finishes.
///
/// # Parameters
///
/// * `client_stream` - Accepted client stream, in blocking mode
/// * `config` - Multiplexer configuration
/// * `sniffer` - Detectors to run
/// * `on_backend` - Called with the backend stream once it is connected,
///   before relaying starts, so the caller can track it for shutdown
///
/// # Returns
///
/// Returns the route taken, or the error that ended the connection early.
pub fn handle_connection<F>(
    client_stream: TcpStream,
    config: &MuxConfig,
    sniffer: &Sniffer,
    on_backend: F,
) -> Result<Route>
where
    F: FnOnce(&TcpStream),
{
    let peer = client_stream.peer_addr()?;
    client_stream.set_read_timeout(Some(config.detect_timeout()))?;

    let server = Server::with_config(client_stream, &config.tease());
    let detected = match sniffer.sniff(&server) {
        Ok(Some(info)) => Some(info),
        Ok(None) => {
            server.pipe()?;
            None
        }
        Err(e) => {
            warn!("Detection failed for {}: {}", peer, e);
            metrics::record_detection_failure();
            return Err(e);
        }
    };
    server.set_timeout(None)?;

    let route = Route::for_protocol(detected.as_ref());
    let target = route.target(config);
    let backend = match connect_backend(target, config.connect_timeout()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Cannot reach {} backend {} for {}: {}", route, target, peer, e);
            metrics::record_backend_failure(route.label());
            Conn::close(&server)?;
            return Err(e);
        }
    };

    on_backend(&backend);

    match &detected {
        Some(info) => info!("{} -> {} ({}, {})", peer, target, route, info),
        None => info!("{} -> {} ({})", peer, target, route),
    }
    metrics::record_routed(route.label());

    let (upstream, downstream) = proxy_data(&server, &backend);
    metrics::record_relayed(upstream, downstream);
    debug!("{} closed: {} bytes up, {} bytes down", peer, upstream, downstream);

    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_for_protocol() {
        assert_eq!(Route::for_protocol(Some(&ProtocolInfo::named("TLS"))), Route::Tls);
        assert_eq!(Route::for_protocol(Some(&ProtocolInfo::named("HTTP"))), Route::Http);
        assert_eq!(Route::for_protocol(Some(&ProtocolInfo::named("SSH"))), Route::Fallback);
        assert_eq!(Route::for_protocol(None), Route::Fallback);
    }

    #[test]
    fn test_route_targets() {
        let mut config = MuxConfig::default();
        assert_eq!(Route::Tls.target(&config), "127.0.0.1:8443");
        assert_eq!(Route::Http.target(&config), "127.0.0.1:8080");

        config.http_target = Some("127.0.0.1:8000".to_string());
        assert_eq!(Route::Http.target(&config), "127.0.0.1:8000");
        assert_eq!(Route::Fallback.target(&config), "127.0.0.1:8080");
        assert_eq!(Route::Fallback.to_string(), "fallback");
    }

    #[test]
    fn test_connect_backend_refused() {
        // Bind and drop to find a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let target = format!("127.0.0.1:{}", port);

        let err = connect_backend(&target, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TeaseError::Io(_)));
    }
}
