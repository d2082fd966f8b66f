//! Protocol multiplexer
//!
//! Accepts TCP connections on one port, sniffs each one through a
//! [`Server`](crate::conn::Server) wrapper and relays it to the backend
//! configured for the detected protocol.
//!
//! The accept loop runs on tokio. Each connection is handled on the blocking
//! pool: the wrappers are synchronous, and the relay uses one extra thread
//! per connection.

mod forwarder;
mod handler;
pub mod metrics;
mod server;

pub use forwarder::proxy_data;
pub use handler::{connect_backend, handle_connection, Route};
pub use server::Mux;
