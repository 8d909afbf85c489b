//! Unix socket acceptor and shutdown coordination.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::lifecycle::Lifecycle;
use crate::pool::{ConnectionPool, TcpConnector};
use crate::session::{DrainTracker, Session};

/// Fixed backoff before retrying a non-fatal accept failure
const ACCEPT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// The relay server: accept loop, session spawning, and shutdown drain
#[derive(Debug)]
pub struct RelayServer {
    config: RelayConfig,
    pool: ConnectionPool,
    tracker: Arc<DrainTracker>,
    lifecycle: Arc<Lifecycle>,
}

impl RelayServer {
    /// Build the server, eagerly initializing the backend connection pool
    ///
    /// Pool initialization failure is fatal: the process should exit with
    /// code 1 without accepting any connections.
    pub async fn new(config: RelayConfig) -> RelayResult<Self> {
        let connector = TcpConnector::new(config.backend_addr.clone());
        let pool = ConnectionPool::connect(config.pool.clone(), connector).await?;
        Ok(Self {
            config,
            pool,
            tracker: DrainTracker::new(),
            lifecycle: Arc::new(Lifecycle::new()),
        })
    }

    /// Handle to the lifecycle state machine, for signal handlers and tests
    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// The backend connection pool, diagnostics only
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Install SIGTERM / SIGINT handlers that begin draining
    pub fn install_signal_handlers(&self) {
        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                return;
            }
            info!("Ctrl+C received, initiating shutdown");
            lifecycle.begin_drain();
        });

        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("SIGTERM received, initiating shutdown");
                    lifecycle.begin_drain();
                }
                Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
            }
        });
    }

    /// Accept clients until the lifecycle begins draining, then drain
    /// active sessions under the shutdown timeout and reclaim resources
    pub async fn run(self) -> RelayResult<()> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path).map_err(|e| {
                RelayError::bind(format!("failed to remove stale socket file: {e}"))
            })?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)
            .map_err(|e| RelayError::bind(e.to_string()))?;
        info!(
            path = ?self.config.socket_path,
            backend = %self.config.backend_addr,
            pool_size = self.pool.size(),
            "Relay listening"
        );

        let mut shutdown = self.lifecycle.shutdown_signal();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Acceptance stopped");
                    break;
                }
                res = listener.accept() => match res {
                    Ok((stream, _addr)) => {
                        // Register before spawning so the drain count can
                        // never miss a session that is accepted but not yet
                        // scheduled.
                        let guard = self.tracker.register();
                        let pool = self.pool.clone();
                        tokio::spawn(Session::run(pool, stream, guard));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed, retrying");
                        tokio::time::sleep(ACCEPT_RETRY_BACKOFF).await;
                    }
                }
            }
        }

        let drained = tokio::time::timeout(
            self.config.shutdown_timeout,
            self.tracker.wait_idle(),
        )
        .await
        .is_ok();
        if drained {
            info!("All sessions drained");
        } else {
            // Abandoned sessions are not force-closed; process exit will
            // take their sockets down.
            warn!(
                active = self.tracker.active(),
                "Shutdown timeout elapsed, abandoning active sessions"
            );
        }

        self.pool.close_all();
        drop(listener);
        if let Err(e) = std::fs::remove_file(&self.config.socket_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(error = %e, "Failed to remove socket file");
        }
        self.lifecycle.mark_stopped();
        Ok(())
    }
}
