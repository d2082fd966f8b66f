//! Configuration loading
//!
//! Layers, lowest priority first:
//! 1. Default values (serde `default` attributes)
//! 2. JSON configuration file
//! 3. `CONN_TEASE_*` environment variables
//!
//! Command line overrides are applied on top by the binary.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use log::debug;
use serde::de::DeserializeOwned;

use crate::common::{Result, TeaseError};
use crate::config::defaults;
use crate::config::{MuxConfig, TeaseConfig};

/// Trait for loading configuration from files and the environment
pub trait ConfigLoader: Sized {
    /// Load from a JSON file (which must exist) layered over defaults
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self>;

    /// Load from `CONN_TEASE_*` environment variables layered over defaults
    fn from_env() -> Result<Self>;

    /// Load defaults, then `path` if given (or the file named by
    /// `CONN_TEASE_CONFIG_FILE`, or `conn-tease.json` when present), then the
    /// environment
    fn auto_load(path: Option<&Path>) -> Result<Self>;
}

/// Where the configuration file comes from
fn config_file(explicit: Option<&Path>) -> (PathBuf, bool) {
    if let Some(path) = explicit {
        return (path.to_path_buf(), true);
    }
    match std::env::var(defaults::CONFIG_FILE_ENV) {
        Ok(path) => (PathBuf::from(path), true),
        Err(_) => (PathBuf::from(defaults::DEFAULT_CONFIG_FILE), false),
    }
}

fn environment() -> Environment {
    Environment::with_prefix(defaults::ENV_PREFIX).try_parsing(true)
}

fn build<T: DeserializeOwned>(file: Option<(&Path, bool)>, with_env: bool) -> Result<T> {
    let mut builder = Config::builder();

    if let Some((path, required)) = file {
        debug!("Configuration file: {} (required: {})", path.display(), required);
        builder = builder.add_source(
            File::from(path)
                .format(FileFormat::Json)
                .required(required),
        );
    }
    if with_env {
        builder = builder.add_source(environment());
    }

    builder
        .build()
        .and_then(|cfg| cfg.try_deserialize::<T>())
        .map_err(|e| TeaseError::Config(format!("Failed to load configuration: {}", e)))
}

impl ConfigLoader for MuxConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        build(Some((path.as_ref(), true)), false)
    }

    fn from_env() -> Result<Self> {
        build(None, true)
    }

    fn auto_load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = config_file(path);
        build(Some((&path, required)), true)
    }
}

impl ConfigLoader for TeaseConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        build(Some((path.as_ref(), true)), false)
    }

    fn from_env() -> Result<Self> {
        build(None, true)
    }

    fn auto_load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = config_file(path);
        build(Some((&path, required)), true)
    }
}
