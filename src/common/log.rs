//! Logging helpers
//!
//! Thin wrapper around `env_logger` so the binary and tests configure logging
//! the same way.

/// Initialize the logging system
///
/// `RUST_LOG` wins over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Log level (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) is not an error worth failing on.
    let _ = env_logger::Builder::from_env(env).try_init();
}
