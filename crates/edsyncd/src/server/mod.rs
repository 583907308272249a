//! Unix socket server for the edsync daemon.
//!
//! The server:
//! - Listens on a Unix socket for adapter connections
//! - Spawns a ConnectionHandler for each adapter
//! - Assigns each connection its session id from a per-process counter
//! - Supports graceful shutdown via CancellationToken
//!
//! ```text
//! ┌────────────────┐
//! │   SyncServer   │
//! │  UnixListener  │
//! └──────┬─────────┘
//!        │ accept()
//!        ▼
//! ┌─────────────────┐      ┌──────────────┐
//! │ConnectionHandler│─────▶│ EngineHandle │
//! │  (per adapter)  │      └──────────────┘
//! └─────────────────┘
//! ```

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::EngineHandle;

/// Unix socket server accepting adapter connections.
pub struct SyncServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    /// Handle to the sync engine
    engine: EngineHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Counter for assigning session ids; ids start at 1 and are never
    /// reused within one daemon run.
    connection_counter: AtomicU64,
}

impl SyncServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        engine: EngineHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            engine,
            cancel_token,
            connection_counter: AtomicU64::new(1),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Remove existing socket file if present
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;
        }

        // Create parent directory if needed
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(
            socket = %self.socket_path.display(),
            "Sync server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Keep accepting other connections
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Spawns a handler task for one adapter connection.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let engine = self.engine.clone();

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(reader, writer, engine, connection_number);
            handler.run().await;
        });
    }

    /// Removes the socket file on shutdown.
    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }
        info!("Server cleanup complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
