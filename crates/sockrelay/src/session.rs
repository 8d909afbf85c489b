//! Per-client session lifecycle and drain tracking.
//!
//! A session binds one accepted client connection to one pooled backend
//! connection and runs a relay between them. Registration with the drain
//! tracker happens synchronously in the acceptor, before the session task is
//! spawned, so the tracker can never undercount a session that has been
//! accepted but not yet scheduled.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tracing::debug;

use crate::pool::ConnectionPool;
use crate::relay;

/// Process-wide count of active sessions, watched during shutdown drain
#[derive(Debug, Default)]
pub struct DrainTracker {
    active: Mutex<usize>,
    idle: Notify,
}

impl DrainTracker {
    /// Create a shared tracker
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a session, returning a guard that deregisters on drop
    ///
    /// Must be called before the session task is spawned; the guard moves
    /// into the task so deregistration covers every exit path.
    pub fn register(self: &Arc<Self>) -> SessionGuard {
        *self.active.lock() += 1;
        SessionGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Number of currently active sessions
    #[must_use]
    pub fn active(&self) -> usize {
        *self.active.lock()
    }

    /// Wait until every registered session has deregistered
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Arm the waiter before checking the count so a deregistration
            // landing in between cannot be missed.
            notified.as_mut().enable();
            if *self.active.lock() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn deregister(&self) {
        let mut active = self.active.lock();
        *active -= 1;
        if *active == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// RAII registration of one active session with the drain tracker
pub struct SessionGuard {
    tracker: Arc<DrainTracker>,
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("active", &self.tracker.active())
            .finish()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.deregister();
    }
}

/// One accepted client bound to one pooled backend connection
#[derive(Debug)]
pub struct Session;

impl Session {
    /// Run a session to completion
    ///
    /// Acquires a backend connection, relays until either side ends, and
    /// closes the client connection on every exit path. An acquisition
    /// failure is terminal for this session only: the client is closed and
    /// no relay is attempted.
    pub async fn run(pool: ConnectionPool, client: UnixStream, guard: SessionGuard) {
        let _guard = guard;
        debug!(pool_size = pool.size(), "Client connected");

        let backend = match pool.acquire().await {
            Ok(backend) => backend,
            Err(e) => {
                debug!(error = %e, "Backend acquisition failed, closing client");
                return;
            }
        };

        let outcome = relay::run(&pool, client, backend).await;
        debug!(
            ?outcome,
            pool_size = pool.size(),
            "Client disconnected"
        );
    }
}
