//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the crate.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use self::error::{TeaseError, Result};
pub use self::log::init_logger;
pub use self::net::parse_socket_addr;
