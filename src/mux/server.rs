//! Multiplexer server module
//!
//! This module implements the accept loop: connections are accepted on
//! tokio, handed to the blocking pool, and closed on shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use super::handler::{handle_connection, Route};
use super::metrics;
use crate::common::Result;
use crate::config::MuxConfig;
use crate::protocol::Sniffer;

/// Streams of live connections, so shutdown can unblock their threads.
///
/// Each connection owns a group: the client stream, plus the backend stream
/// once one is connected.
#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Vec<TcpStream>>>,
}

impl Registry {
    fn insert(&self, stream: &TcpStream) -> Option<u64> {
        let clone = stream.try_clone().ok()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, vec![clone]);
        Some(id)
    }

    /// Add `stream` to the group of connection `id`.
    ///
    /// If the group is gone (shutdown already ran), `stream` is shut down
    /// at once instead.
    fn attach(&self, id: u64, stream: &TcpStream) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        match live.get_mut(&id) {
            Some(group) => match stream.try_clone() {
                Ok(clone) => group.push(clone),
                Err(e) => debug!("Cannot track backend stream of connection {}: {}", id, e),
            },
            None => shut_down(stream),
        }
    }

    fn remove(&self, id: u64) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn close_all(&self) -> usize {
        let live = std::mem::take(&mut *self.live.lock().unwrap_or_else(PoisonError::into_inner));
        for stream in live.values().flatten() {
            shut_down(stream);
        }
        live.len()
    }
}

fn shut_down(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("Error shutting down stream: {}", e);
    }
}

/// Multiplexer server
///
/// Listens on one address and routes each connection by protocol.
pub struct Mux {
    /// Configuration (shared with connection tasks)
    config: Arc<MuxConfig>,
    /// Detectors (shared with connection tasks)
    sniffer: Arc<Sniffer>,
    registry: Arc<Registry>,
}

impl Mux {
    /// Create a multiplexer that detects TLS and HTTP
    pub fn new(config: MuxConfig) -> Self {
        Self::with_sniffer(config, Sniffer::standard())
    }

    /// Create a multiplexer with custom detectors
    ///
    /// Detected protocols other than TLS and HTTP are sent to the fallback
    /// backend.
    pub fn with_sniffer(config: MuxConfig, sniffer: Sniffer) -> Self {
        Self {
            config: Arc::new(config),
            sniffer: Arc::new(sniffer),
            registry: Arc::default(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Bind the configured address and serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns an error if it cannot bind to the listen address.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()?).await?;
        info!("Multiplexer listening on {}", listener.local_addr()?);

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received");
        })
        .await
    }

    /// Serve connections from `listener` until `shutdown` completes
    ///
    /// On shutdown, live connections are closed and their handlers awaited.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();

        loop {
            // Reap finished handlers
            while let Some(result) = tasks.try_join_next() {
                log_outcome(result);
            }

            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let stream = match stream.into_std().and_then(|s| s.set_nonblocking(false).map(|_| s)) {
                            Ok(stream) => stream,
                            Err(e) => {
                                error!("Cannot hand over connection from {}: {}", peer, e);
                                continue;
                            }
                        };

                        metrics::record_connection_accepted();
                        let config = Arc::clone(&self.config);
                        let sniffer = Arc::clone(&self.sniffer);
                        let registry = Arc::clone(&self.registry);
                        // Registered here so a shutdown right after accept still sees it.
                        let id = registry.insert(&stream);
                        tasks.spawn_blocking(move || {
                            let outcome = handle_connection(stream, &config, &sniffer, |backend| {
                                if let Some(id) = id {
                                    registry.attach(id, backend);
                                }
                            });
                            if let Some(id) = id {
                                registry.remove(id);
                            }
                            metrics::record_connection_closed();
                            outcome
                        });
                    }
                    Err(e) => error!("Error accepting connection: {}", e),
                },
            }
        }

        let closed = self.registry.close_all();
        info!("Shutting down, closed {} live connections", closed);
        while let Some(result) = tasks.join_next().await {
            log_outcome(result);
        }
        Ok(())
    }
}

fn log_outcome(result: std::result::Result<Result<Route>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(route)) => debug!("Connection on {} route finished", route),
        Ok(Err(e)) => debug!("Connection ended with error: {}", e),
        Err(e) => error!("Task error: {}", e),
    }
}
