//! Configuration validator

use log::warn;

use crate::common::{parse_socket_addr, Result, TeaseError};
use crate::config::{MuxConfig, TeaseConfig};

/// Trait for validating configuration
pub trait ConfigValidator {
    /// Reject configurations that cannot work
    fn validate(&self) -> Result<()>;

    /// Potential issues that do not prevent startup
    fn check(&self) -> Vec<String>;
}

fn invalid(name: &str, msg: impl Into<String>) -> TeaseError {
    TeaseError::Config(format!("Invalid value for '{}': {}", name, msg.into()))
}

impl ConfigValidator for TeaseConfig {
    fn validate(&self) -> Result<()> {
        if self.max_buffer == 0 {
            return Err(invalid("max_buffer", "must be greater than 0"));
        }
        if self.seek_chunk == 0 {
            return Err(invalid("seek_chunk", "must be greater than 0"));
        }
        Ok(())
    }

    fn check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_buffer > 1024 * 1024 {
            warnings.push(format!(
                "max_buffer of {} bytes lets every detecting connection hold that much memory",
                self.max_buffer
            ));
        }
        warnings
    }
}

impl ConfigValidator for MuxConfig {
    fn validate(&self) -> Result<()> {
        self.tease().validate()?;

        let listen = self.listen_addr()?;
        let mut targets = vec![("tls_target", &self.tls_target), ("fallback_target", &self.fallback_target)];
        if let Some(http) = &self.http_target {
            targets.push(("http_target", http));
        }
        for (name, target) in targets {
            let addr = parse_socket_addr(target)?;
            if addr == listen {
                return Err(TeaseError::Config(format!(
                    "Listen address and {} must be different ({})",
                    name, addr
                )));
            }
        }

        if self.detect_timeout_ms == 0 {
            return Err(invalid("detect_timeout_ms", "must be greater than 0"));
        }
        if self.connect_timeout == 0 {
            return Err(invalid("connect_timeout", "must be greater than 0"));
        }
        Ok(())
    }

    fn check(&self) -> Vec<String> {
        let mut warnings = self.tease().check();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => warnings.push(format!("Unknown log level: {}. Using default: info", level)),
        }
        if self.max_buffer < 16 {
            warnings.push(format!(
                "max_buffer of {} bytes is too small to hold a TLS record header plus an HTTP method",
                self.max_buffer
            ));
        }
        for warning in &warnings {
            warn!("{}", warning);
        }
        warnings
    }
}
