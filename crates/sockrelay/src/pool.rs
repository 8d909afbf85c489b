//! Bounded backend connection pool.
//!
//! The pool eagerly dials a configured minimum of backend connections at
//! startup, lends them out to sessions one at a time, and destroys idle
//! connections past their idle timeout. Live connection count never exceeds
//! the configured maximum.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::error::{RelayError, RelayResult};

/// Factory for backend connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dial a fresh connection to the backend
    async fn connect(&self) -> std::io::Result<TcpStream>;
}

/// Default connector dialing a fixed TCP address
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Create a connector for the given backend address
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> std::io::Result<TcpStream> {
        TcpStream::connect(&self.addr).await
    }
}

/// Idle connection with its park timestamp
struct IdleConn {
    stream: TcpStream,
    parked_at: Instant,
}

/// Shared pool state; `live` counts idle plus checked-out connections
struct PoolState {
    idle: VecDeque<IdleConn>,
    live: usize,
    closed: bool,
}

/// Bounded pool of reusable backend connections
///
/// Cloning is cheap and shares the underlying pool. All operations are safe
/// under arbitrary concurrent callers.
#[derive(Clone)]
pub struct ConnectionPool {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    state: Arc<Mutex<PoolState>>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("live", &state.live)
            .field("idle", &state.idle.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl ConnectionPool {
    /// Build a pool, eagerly dialing the configured minimum of connections
    ///
    /// Fails if any of the initial connections cannot be established.
    pub async fn connect(
        config: PoolConfig,
        connector: impl Connector,
    ) -> RelayResult<Self> {
        if config.min_connections > config.max_connections {
            return Err(RelayError::pool_init(format!(
                "min_connections {} exceeds max_connections {}",
                config.min_connections, config.max_connections
            )));
        }

        let connector: Arc<dyn Connector> = Arc::new(connector);
        let mut idle = VecDeque::with_capacity(config.min_connections);
        for _ in 0..config.min_connections {
            let stream = connector
                .connect()
                .await
                .map_err(|e| RelayError::pool_init(e.to_string()))?;
            idle.push_back(IdleConn {
                stream,
                parked_at: Instant::now(),
            });
        }

        let live = idle.len();
        debug!(live, "Connection pool initialized");

        let pool = Self {
            config,
            connector,
            state: Arc::new(Mutex::new(PoolState {
                idle,
                live,
                closed: false,
            })),
        };
        pool.start_reaper_task();
        Ok(pool)
    }

    /// Borrow a ready-to-use backend connection
    ///
    /// Reuses the most recently parked idle connection, destroying
    /// idle-expired ones on the way; dials a new connection if the pool is
    /// under capacity. Fails with [`RelayError::PoolExhausted`] when the
    /// maximum is reached with nothing idle.
    pub async fn acquire(&self) -> RelayResult<TcpStream> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(RelayError::PoolClosed);
            }
            while let Some(conn) = state.idle.pop_back() {
                if conn.parked_at.elapsed() > self.config.idle_timeout {
                    state.live -= 1;
                    trace!("Discarding idle-expired pooled connection");
                    continue;
                }
                return Ok(conn.stream);
            }
            if state.live >= self.config.max_connections {
                return Err(RelayError::PoolExhausted);
            }
            // Reserve the slot before dialing so concurrent acquires
            // cannot overshoot the maximum.
            state.live += 1;
        }

        match self.connector.connect().await {
            Ok(stream) => {
                trace!("Dialed new backend connection");
                Ok(stream)
            }
            Err(e) => {
                self.state.lock().live -= 1;
                Err(RelayError::backend(e.to_string()))
            }
        }
    }

    /// Return a connection for reuse
    ///
    /// Destroys it instead when the pool is closed or already holds a full
    /// complement of idle connections. Never blocks.
    pub fn release(&self, stream: TcpStream) {
        let mut state = self.state.lock();
        if state.closed || state.idle.len() >= self.config.max_connections {
            state.live -= 1;
            trace!("Destroying returned backend connection");
            return;
        }
        state.idle.push_back(IdleConn {
            stream,
            parked_at: Instant::now(),
        });
    }

    /// Forget a checked-out connection that died in flight
    pub fn discard(&self) {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        trace!("Discarded checked-out backend connection");
    }

    /// Current live connection count (idle plus checked out), diagnostics only
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().live
    }

    /// Destroy all idle connections and refuse further acquisitions
    ///
    /// Connections still checked out are settled by their sessions through
    /// [`release`](Self::release) or [`discard`](Self::discard).
    pub fn close_all(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let count = state.idle.len();
        state.live -= count;
        state.idle.clear();
        debug!(count, "Closed idle pool connections");
    }

    /// Periodically destroy idle connections past their idle timeout
    fn start_reaper_task(&self) {
        let idle_timeout = self.config.idle_timeout;
        let state: Weak<Mutex<PoolState>> = Arc::downgrade(&self.state);

        let period = idle_timeout
            .max(std::time::Duration::from_secs(1))
            .min(std::time::Duration::from_secs(60));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(state) = state.upgrade() else { break };
                let mut state = state.lock();
                if state.closed {
                    break;
                }
                let before = state.idle.len();
                state
                    .idle
                    .retain(|conn| conn.parked_at.elapsed() <= idle_timeout);
                let reaped = before - state.idle.len();
                if reaped > 0 {
                    state.live -= reaped;
                    debug!(reaped, "Reaped idle-expired pool connections");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Backend that accepts and parks connections
    async fn sink_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                held.push(stream);
            }
        });
        addr
    }

    fn pool_config(min: usize, max: usize, idle_secs: u64) -> PoolConfig {
        PoolConfig {
            min_connections: min,
            max_connections: max,
            idle_timeout: Duration::from_secs(idle_secs),
        }
    }

    #[tokio::test]
    async fn test_pool_eager_minimum() {
        let addr = sink_backend().await;
        let pool = ConnectionPool::connect(pool_config(3, 5, 60), TcpConnector::new(addr))
            .await
            .unwrap();
        assert_eq!(pool.size(), 3);
    }

    #[tokio::test]
    async fn test_pool_init_failure_on_unreachable_backend() {
        // Reserved port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result =
            ConnectionPool::connect(pool_config(1, 2, 60), TcpConnector::new(addr)).await;
        assert!(matches!(result, Err(RelayError::PoolInit(_))));
    }

    #[tokio::test]
    async fn test_pool_rejects_min_over_max() {
        let result =
            ConnectionPool::connect(pool_config(3, 1, 60), TcpConnector::new("unused")).await;
        assert!(matches!(result, Err(RelayError::PoolInit(_))));
    }

    #[tokio::test]
    async fn test_acquire_release_reuses_connection() {
        let addr = sink_backend().await;
        let pool = ConnectionPool::connect(pool_config(1, 2, 60), TcpConnector::new(addr))
            .await
            .unwrap();

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.size(), 1);
        pool.release(conn);
        assert_eq!(pool.size(), 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn test_acquire_fails_when_exhausted() {
        let addr = sink_backend().await;
        let pool = ConnectionPool::connect(pool_config(0, 1, 60), TcpConnector::new(addr))
            .await
            .unwrap();

        let held = pool.acquire().await.unwrap();
        let second = pool.acquire().await;
        assert!(matches!(second, Err(RelayError::PoolExhausted)));

        pool.release(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_discard_frees_capacity() {
        let addr = sink_backend().await;
        let pool = ConnectionPool::connect(pool_config(0, 1, 60), TcpConnector::new(addr))
            .await
            .unwrap();

        let conn = pool.acquire().await.unwrap();
        drop(conn);
        pool.discard();
        assert_eq!(pool.size(), 0);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_skips_idle_expired_connection() {
        let addr = sink_backend().await;
        let pool = ConnectionPool::connect(pool_config(1, 2, 1), TcpConnector::new(addr))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        // The parked connection is past its idle timeout; acquire must dial
        // a replacement rather than hand back the stale one.
        let _conn = pool.acquire().await.unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn test_close_all_empties_pool() {
        let addr = sink_backend().await;
        let pool = ConnectionPool::connect(pool_config(2, 4, 60), TcpConnector::new(addr))
            .await
            .unwrap();

        pool.close_all();
        assert_eq!(pool.size(), 0);
        assert!(matches!(pool.acquire().await, Err(RelayError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_release_after_close_destroys() {
        let addr = sink_backend().await;
        let pool = ConnectionPool::connect(pool_config(1, 2, 60), TcpConnector::new(addr))
            .await
            .unwrap();

        let conn = pool.acquire().await.unwrap();
        pool.close_all();
        pool.release(conn);
        assert_eq!(pool.size(), 0);
    }
}
