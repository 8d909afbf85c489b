//! Relay error types and handling

use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while running the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Listener could not be bound to the socket path
    #[error("Failed to bind listener: {0}")]
    Bind(String),

    /// Initial pool sizing failed
    #[error("Failed to initialize connection pool: {0}")]
    PoolInit(String),

    /// Pool is at capacity with no idle connection available
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Pool has been shut down
    #[error("Connection pool closed")]
    PoolClosed,

    /// Backend connection could not be established
    #[error("Backend connection failed: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown coordination error
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl RelayError {
    /// Create a bind error
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind(message.into())
    }

    /// Create a pool initialization error
    pub fn pool_init(message: impl Into<String>) -> Self {
        Self::PoolInit(message.into())
    }

    /// Create a backend connection error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Whether this error is fatal at startup (exit code 1 territory)
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind(_) | Self::PoolInit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::bind("address in use");
        assert_eq!(err.to_string(), "Failed to bind listener: address in use");

        let err = RelayError::PoolExhausted;
        assert_eq!(err.to_string(), "Connection pool exhausted");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RelayError::bind("x").is_fatal());
        assert!(RelayError::pool_init("x").is_fatal());
        assert!(!RelayError::PoolExhausted.is_fatal());
        assert!(!RelayError::backend("x").is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
