//! Connection factories.
//!
//! The pool never constructs a raw connection itself; it delegates creation,
//! liveness checks and teardown to a [`ConnectionFactory`].

use std::future::Future;
use std::io;
use std::mem::MaybeUninit;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Creates, validates and closes connections to an address.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type handed out by the pool.
    type Connection: Send + 'static;

    /// Open a new connection to `addr`.
    fn new_connection(&self, addr: &str)
        -> impl Future<Output = io::Result<Self::Connection>> + Send;

    /// Close a connection, consuming it.
    fn close(&self, conn: Self::Connection) -> impl Future<Output = io::Result<()>> + Send;

    /// Check that a connection is still usable.
    fn ping(&self, conn: &mut Self::Connection) -> impl Future<Output = io::Result<()>> + Send;
}

/// Default connect timeout for [`TcpConnectionFactory`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory producing plain TCP streams.
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    connect_timeout: Duration,
    keep_alive: Option<Duration>,
    nodelay: bool,
}

impl TcpConnectionFactory {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive: None,
            nodelay: true,
        }
    }

    /// Bound the time spent establishing a connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable TCP keep-alive probes after `idle` of inactivity.
    pub fn with_keep_alive(mut self, idle: Duration) -> Self {
        self.keep_alive = Some(idle);
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    type Connection = TcpStream;

    async fn new_connection(&self, addr: &str) -> io::Result<TcpStream> {
        if addr.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "address is empty"));
        }

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out after {:?}", addr, self.connect_timeout),
                )
            })??;

        stream.set_nodelay(self.nodelay)?;
        if let Some(idle) = self.keep_alive {
            crate::net::socket::set_keep_alive(&stream, idle)?;
        }

        tracing::trace!(addr = %addr, local_addr = ?stream.local_addr().ok(), "Dialed upstream");
        Ok(stream)
    }

    async fn close(&self, mut conn: TcpStream) -> io::Result<()> {
        match conn.shutdown().await {
            // The peer may already be gone; the socket is released on drop either way.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    async fn ping(&self, conn: &mut TcpStream) -> io::Result<()> {
        probe_alive(conn)
    }
}

/// Non-blocking liveness probe.
///
/// Peeks one byte without consuming it. `WouldBlock` means the socket is
/// open with nothing to read, which is the healthy state for an idle
/// connection. A zero-length read means the peer closed its side.
fn probe_alive(stream: &TcpStream) -> io::Result<()> {
    let mut buf = [MaybeUninit::<u8>::uninit(); 1];
    match socket2::SockRef::from(stream).peek(&mut buf) {
        Ok(0) => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        )),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e),
    }
}
