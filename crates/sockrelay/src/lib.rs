//! # sockrelay
//!
//! A local relay that accepts client connections on a Unix domain socket and
//! forwards their byte streams to a single fixed TCP backend, reusing a small
//! pool of pre-established backend connections to amortize connection setup.
//!
//! ## Architecture
//!
//! - **Pool**: a bounded, concurrency-safe pool of backend connections with
//!   idle expiry and eager minimum sizing.
//! - **Relay**: the per-session bidirectional byte shuttle, built on two read
//!   pumps feeding a single dispatch loop over capacity-1 channels.
//! - **Session**: one accepted client bound to one borrowed backend
//!   connection, with guaranteed cleanup and drain registration.
//! - **Server**: the accept loop plus the shutdown coordinator that stops
//!   acceptance, drains active sessions under a deadline, and reclaims the
//!   socket file and pool.
//!
//! ## Module Organization
//!
//! ```text
//! sockrelay/
//! ├── config/     # Immutable relay and pool configuration
//! ├── error/      # Error types and result alias
//! ├── pool/       # Bounded backend connection pool
//! ├── relay/      # Read pumps and the bidirectional dispatch loop
//! ├── session/    # Per-client lifecycle and drain tracking
//! ├── lifecycle/  # Running/Draining/Stopped shutdown state machine
//! └── server/     # Unix socket acceptor and shutdown coordination
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod relay;
pub mod server;
pub mod session;

pub use config::{PoolConfig, RelayConfig};
pub use error::{RelayError, RelayResult};
pub use lifecycle::{Lifecycle, RelayState};
pub use pool::{ConnectionPool, Connector, TcpConnector};
pub use server::RelayServer;
pub use session::DrainTracker;
