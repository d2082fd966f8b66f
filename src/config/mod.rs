//! Configuration module
//!
//! [`TeaseConfig`] carries the knobs of the connection wrappers and readers.
//! [`MuxConfig`] is the configuration of the `conn-tease` multiplexer binary
//! and embeds the same knobs. Both load from defaults, an optional JSON file
//! and `CONN_TEASE_*` environment variables (see [`ConfigLoader`]).

pub mod defaults;
mod loader;
mod validator;

pub use self::defaults::ENV_PREFIX;
pub use self::loader::ConfigLoader;
pub use self::validator::ConfigValidator;

use std::net::SocketAddr;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::common::{parse_socket_addr, Result};

/// Buffering limits for detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TeaseConfig {
    /// Ceiling (bytes) for unread buffered input or unflushed output while
    /// detecting. Going past it faults the connection and closes it.
    #[serde(default = "defaults::max_buffer")]
    pub max_buffer: usize,

    /// Scratch size (bytes) used when a reader seeks forward by discarding
    #[serde(default = "defaults::seek_chunk")]
    pub seek_chunk: usize,
}

impl Default for TeaseConfig {
    fn default() -> Self {
        Self {
            max_buffer: defaults::max_buffer(),
            seek_chunk: defaults::seek_chunk(),
        }
    }
}

/// Multiplexer configuration
///
/// One listening port; TLS connections go to `tls_target`, connections that
/// look like HTTP go to `http_target` when it is set, everything else goes to
/// `fallback_target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MuxConfig {
    /// Listen address
    #[serde(default = "defaults::listen")]
    pub listen: String,

    /// Backend for TLS connections (host:port)
    #[serde(default = "defaults::tls_target")]
    pub tls_target: String,

    /// Backend for HTTP connections; falls back to `fallback_target` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_target: Option<String>,

    /// Backend for anything not claimed by a detector
    #[serde(default = "defaults::fallback_target")]
    pub fallback_target: String,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Read timeout while sniffing, in milliseconds
    #[serde(default = "defaults::detect_timeout_ms")]
    pub detect_timeout_ms: u64,

    /// Backend connect timeout, in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout: u64,

    /// See [`TeaseConfig::max_buffer`]
    #[serde(default = "defaults::max_buffer")]
    pub max_buffer: usize,

    /// See [`TeaseConfig::seek_chunk`]
    #[serde(default = "defaults::seek_chunk")]
    pub seek_chunk: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            tls_target: defaults::tls_target(),
            http_target: None,
            fallback_target: defaults::fallback_target(),
            log_level: defaults::log_level(),
            detect_timeout_ms: defaults::detect_timeout_ms(),
            connect_timeout: defaults::connect_timeout(),
            max_buffer: defaults::max_buffer(),
            seek_chunk: defaults::seek_chunk(),
        }
    }
}

impl MuxConfig {
    /// The wrapper knobs embedded in this configuration
    pub fn tease(&self) -> TeaseConfig {
        TeaseConfig {
            max_buffer: self.max_buffer,
            seek_chunk: self.seek_chunk,
        }
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.listen)
    }

    /// Backend for connections that matched the HTTP detector
    pub fn http_or_fallback(&self) -> &str {
        self.http_target.as_deref().unwrap_or(&self.fallback_target)
    }

    /// Read timeout applied while sniffing
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    /// Backend connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Log the effective configuration
    pub fn log(&self) {
        if !log::log_enabled!(log::Level::Info) {
            return;
        }

        info!("=== Effective Configuration ===");
        info!("  Listen address: {}", self.listen);
        info!("  TLS backend: {}", self.tls_target);
        info!("  HTTP backend: {}", self.http_or_fallback());
        info!("  Fallback backend: {}", self.fallback_target);
        info!("  Detection timeout: {} ms", self.detect_timeout_ms);
        info!("  Connect timeout: {} seconds", self.connect_timeout);
        info!("  Max buffer: {} bytes", self.max_buffer);
        info!("===============================");
    }
}
