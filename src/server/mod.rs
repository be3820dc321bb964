//! TCP acceptor: one independent [`Session`] task per connection.
//!
//! Sessions share nothing but the two stores in [`AppState`]. On shutdown the
//! listener stops accepting, every session finishes the command it is
//! executing, says good bye, and `run` returns once all of them are done.

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::counters::CounterStore;
use crate::session::Session;
use crate::snapshot::SnapshotError;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared state handed to every session.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub counters: Arc<CounterStore>,
}

impl AppState {
    pub fn open(credentials_path: &Path, counters_path: &Path) -> Result<Self, SnapshotError> {
        Ok(Self {
            credentials: Arc::new(CredentialStore::open(credentials_path)?),
            counters: Arc::new(CounterStore::open(counters_path)?),
        })
    }
}

pub struct Server {
    listener: TcpListener,
    state: AppState,
    max_connections: usize,
    max_line_bytes: usize,
}

impl Server {
    /// Open both stores and bind the listener described by `config`.
    pub async fn bind(config: &Config) -> Result<Self> {
        let credentials_path = config.storage.credentials_path();
        let counters_path = config.storage.counters_path();
        let state = AppState::open(&credentials_path, &counters_path)
            .context("Failed to open data stores")?;

        tracing::info!(
            credentials = %credentials_path.display(),
            users = state.credentials.len(),
            counters_file = %counters_path.display(),
            counters = state.counters.len(),
            "Stores loaded"
        );

        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        Ok(Self {
            listener,
            state,
            max_connections: config.server.max_connections,
            max_line_bytes: config.server.max_line_bytes,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Accept connections until `shutdown` is cancelled, then drain sessions.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let limit = match self.max_connections {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        let permits = Arc::new(Semaphore::new(limit));
        let sessions = TaskTracker::new();

        if let Ok(addr) = self.local_addr() {
            tracing::info!(%addr, max_connections = self.max_connections, "Listening");
        }

        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => {
                    permit.context("Connection limiter closed")?
                }
            };

            let (stream, peer) = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Accept failed: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let session = Session::new(self.state.clone());
            let max_line_bytes = self.max_line_bytes;
            let token = shutdown.child_token();
            sessions.spawn(async move {
                let _permit = permit;
                tracing::info!(%peer, "Connection accepted");
                match session.run(stream, max_line_bytes, token).await {
                    Ok(()) => tracing::info!(%peer, "Connection closed"),
                    Err(e) => tracing::info!(%peer, "Connection dropped: {e}"),
                }
            });
        }

        drop(self.listener);
        sessions.close();
        if !sessions.is_empty() {
            tracing::info!(active = sessions.len(), "Waiting for open sessions to finish");
        }
        sessions.wait().await;
        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Bind from `config` and serve until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let server = Server::bind(&config).await?;
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C, shutting down: {e}"),
        }
        signal_token.cancel();
    });

    server.run(shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.port = 0;
        config.storage.data_dir = tmp.path().display().to_string();
        config
    }

    #[tokio::test]
    async fn bind_creates_missing_data_dir() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.storage.data_dir = tmp.path().join("nested").display().to_string();

        let server = Server::bind(&config).await.unwrap();
        assert!(tmp.path().join("nested").is_dir());
        assert!(server.state().credentials.is_empty());
    }

    #[tokio::test]
    async fn run_returns_after_cancel() {
        let tmp = TempDir::new().unwrap();
        let server = Server::bind(&test_config(&tmp)).await.unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn bind_fails_on_bad_address() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.server.host = "not a host".into();
        assert!(Server::bind(&config).await.is_err());
    }
}
