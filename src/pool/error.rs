use thiserror::Error;

/// Error type for connection pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No idle connection is usable and the pool is at its connection limit.
    #[error("connection pool exhausted")]
    Exhausted,

    /// The pool has been shut down.
    #[error("connection pool closed")]
    Closed,

    /// The released connection was not checked out from this pool.
    #[error("connection does not belong to this pool")]
    InvalidConnection,

    /// The pool was constructed with an invalid configuration.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// The factory failed to create a connection.
    #[error("failed to create connection: {0}")]
    Factory(#[source] std::io::Error),
}

impl PoolError {
    /// Returns true if retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::Exhausted | PoolError::Factory(_))
    }
}
