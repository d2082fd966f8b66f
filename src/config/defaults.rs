//! Default configuration values
//!
//! Single source of truth for defaults, shared by the library types, the
//! serde `default` attributes and the command line.

/// Environment variable prefix (`CONN_TEASE_MAX_BUFFER`, ...)
pub const ENV_PREFIX: &str = "CONN_TEASE";

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "CONN_TEASE_CONFIG_FILE";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "conn-tease.json";

/// Default ceiling for buffered input or output during detection (bytes)
pub const MAX_BUFFER: usize = 1024;

/// Default scratch size for discarding forward seeks (bytes)
pub const SEEK_CHUNK: usize = 2048;

/// Default listen address as string
pub const LISTEN_STR: &str = "0.0.0.0:7443";

/// Default TLS backend as string
pub const TLS_TARGET_STR: &str = "127.0.0.1:8443";

/// Default backend for everything that is not TLS
pub const FALLBACK_TARGET_STR: &str = "127.0.0.1:8080";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default max buffer
pub fn max_buffer() -> usize {
    MAX_BUFFER
}

/// Default seek chunk
pub fn seek_chunk() -> usize {
    SEEK_CHUNK
}

/// Default listen address
pub fn listen() -> String {
    LISTEN_STR.to_string()
}

/// Default TLS backend
pub fn tls_target() -> String {
    TLS_TARGET_STR.to_string()
}

/// Default plain backend
pub fn fallback_target() -> String {
    FALLBACK_TARGET_STR.to_string()
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// How long a connection may stay silent while being sniffed (milliseconds)
pub fn detect_timeout_ms() -> u64 {
    3000
}

/// Backend connect timeout in seconds
pub fn connect_timeout() -> u64 {
    10
}

/// Relay buffer size per direction (bytes)
pub const RELAY_BUFFER: usize = 8192;
