use thiserror::Error;

/// Error type for server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The server was closed; returned by `serve` once shutdown starts and by
    /// any attempt to start a closed server.
    #[error("server closed")]
    Closed,

    /// Invalid configuration, detected before any socket is touched.
    #[error("invalid server configuration: {0}")]
    Config(String),

    /// Failed to bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Graceful shutdown ran out of time; the remaining connections were force-closed.
    #[error("{remaining} connection(s) still active after the drain deadline")]
    DrainTimeout { remaining: u64 },
}
