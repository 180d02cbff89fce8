//! TCP server: listener and accept loop.
//!
//! Accepts connections and hands each one to a spawned session task. The
//! accept loop never blocks on a session's lifetime, and a single failed
//! accept never stops the server.

use crate::config::Config;
use crate::session;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Maximum number of concurrent sessions.
const MAX_CONNECTIONS: usize = 10000;

/// Server instance.
pub struct Server {
    config: Arc<Config>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance.
    pub fn new(config: Config) -> Self {
        Server {
            config: Arc::new(config),
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    /// Bind the listener and accept connections until the process exits.
    ///
    /// A bind failure is fatal at startup and propagates to the caller.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!(host = %self.config.host, port = self.config.port, "Server listening");

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "Client connected");

                    let config = Arc::clone(&self.config);

                    tokio::spawn(async move {
                        if let Err(e) = session::handle_session(stream, addr, config).await {
                            debug!(peer = %addr, error = %e, "Session error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Get a reference to the resolved configuration for testing
    #[cfg(test)]
    pub fn config(&self) -> &Config {
        &self.config
    }
}
