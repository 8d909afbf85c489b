//! Relay configuration management

use std::path::PathBuf;
use std::time::Duration;

/// Pool sizing configuration, handed to the pool constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Floor on live backend connections, dialed eagerly at startup
    pub min_connections: usize,
    /// Ceiling on live backend connections
    pub max_connections: usize,
    /// Age after which an idle pooled connection is destroyed
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 5,
            max_connections: 20,
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

/// Relay configuration, constructed once at startup and passed by value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Destination all pooled connections dial
    pub backend_addr: String,
    /// Pool sizing policy
    pub pool: PoolConfig,
    /// Bound on how long shutdown waits for active sessions to drain
    pub shutdown_timeout: Duration,
    /// Filesystem path for the local listening socket
    pub socket_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_addr: "127.0.0.1:6379".to_string(),
            pool: PoolConfig::default(),
            shutdown_timeout: Duration::from_secs(60),
            socket_path: PathBuf::from("/tmp/sockrelay.sock"),
        }
    }
}

impl RelayConfig {
    /// Set the backend target address
    #[must_use]
    pub fn backend_addr(mut self, addr: impl Into<String>) -> Self {
        self.backend_addr = addr.into();
        self
    }

    /// Set the pool sizing policy
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the shutdown drain bound
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the listening socket path
    #[must_use]
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }
}
