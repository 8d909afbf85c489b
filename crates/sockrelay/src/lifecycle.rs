//! Relay lifecycle management and graceful shutdown
//!
//! Shutdown is modeled as an explicit state machine with single-direction
//! transitions so it can be driven and observed in tests without real OS
//! signals.

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Relay states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Accepting new client connections
    Running,
    /// Acceptance stopped, waiting for active sessions to finish
    Draining,
    /// Drain complete or abandoned; resources reclaimed
    Stopped,
}

/// Shutdown signal receiver
pub type ShutdownSignal = broadcast::Receiver<()>;

/// Lifecycle state machine and shutdown broadcaster
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<RelayState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Lifecycle {
    /// Create a lifecycle in the [`RelayState::Running`] state
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(RelayState::Running),
            shutdown_tx,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> RelayState {
        *self.state.lock()
    }

    /// Transition `Running -> Draining` and broadcast the shutdown signal
    ///
    /// Returns whether the transition happened. Termination signals received
    /// while already draining or stopped are ignored.
    pub fn begin_drain(&self) -> bool {
        let mut state = self.state.lock();
        if *state != RelayState::Running {
            tracing::debug!(state = ?*state, "Shutdown signal ignored");
            return false;
        }
        *state = RelayState::Draining;
        let _ = self.shutdown_tx.send(());
        tracing::info!("Shutdown initiated, draining active sessions");
        true
    }

    /// Transition into the terminal [`RelayState::Stopped`] state
    pub fn mark_stopped(&self) {
        *self.state.lock() = RelayState::Stopped;
        tracing::info!("Relay stopped");
    }

    /// Subscribe to shutdown signals
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
