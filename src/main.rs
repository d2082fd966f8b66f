//! Conn Tease Command Line Tool
//!
//! Runs the protocol multiplexer: one listening port, TLS and HTTP
//! connections routed to their own backends.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use conn_tease::common::{init_logger, Result, TeaseError};
use conn_tease::config::{ConfigLoader, ConfigValidator, MuxConfig};
use conn_tease::mux::Mux;
use conn_tease::{APP_NAME, VERSION};

/// Conn Tease: route connections on one port by the protocol they speak
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Backend for TLS connections
    #[arg(long)]
    tls_target: Option<String>,

    /// Backend for HTTP connections (defaults to the fallback backend)
    #[arg(long)]
    http_target: Option<String>,

    /// Backend for everything else
    #[arg(long)]
    fallback_target: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Bytes a connection may buffer while being sniffed
    #[arg(long)]
    max_buffer: Option<usize>,

    /// Silence allowed while sniffing, in milliseconds
    #[arg(long)]
    detect_timeout_ms: Option<u64>,

    /// Backend connect timeout, in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Load configuration from a JSON file
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

impl Args {
    /// Apply command line values over loaded configuration
    fn apply(self, mut config: MuxConfig) -> MuxConfig {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(target) = self.tls_target {
            config.tls_target = target;
        }
        if let Some(target) = self.http_target {
            config.http_target = Some(target);
        }
        if let Some(target) = self.fallback_target {
            config.fallback_target = target;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(max_buffer) = self.max_buffer {
            config.max_buffer = max_buffer;
        }
        if let Some(timeout) = self.detect_timeout_ms {
            config.detect_timeout_ms = timeout;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let dump_config = args.dump_config;

    let config = MuxConfig::auto_load(args.config_file.as_deref())?;
    let config = args.apply(config);

    if dump_config {
        let json = serde_json::to_string_pretty(&config)
            .map_err(|e| TeaseError::Config(format!("Failed to serialize configuration: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    // Initialize logger
    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;
    config.check();
    config.log();

    let mux = Mux::new(config);
    info!("Multiplexer ready, press Ctrl+C to stop");

    mux.run().await?;

    info!("Stopped");
    Ok(())
}
