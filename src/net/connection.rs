//! Per-connection wrapper and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Apply keep-alive and read/write deadlines to accepted sockets
//! - Run the handler, recovering from panics, and always close the socket
//! - Count in-flight connections so shutdown can drain them

use std::any::Any;
use std::backtrace::Backtrace;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::lifecycle::Shutdown;
use crate::net::{socket, ServerStream};
use crate::observability::metrics;
use crate::server::{AbortHandler, ConnContext, Handler};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Deadlines applied to every accepted connection. Zero disables each one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub keep_alive: Duration,
}

/// Tracks in-flight connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
    /// Notified when the count drops to zero.
    idle: Arc<Notify>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(active);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            idle: Arc::clone(&self.idle),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    idle: Arc<Notify>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(remaining);
        if remaining == 0 {
            self.idle.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// An accepted connection owned by the server.
pub(crate) struct ServerConn {
    remote_addr: SocketAddr,
    stream: ServerStream,
    guard: ConnectionGuard,
}

impl ServerConn {
    /// Apply socket options and deadlines to a freshly accepted stream.
    pub(crate) fn wrap(
        stream: TcpStream,
        remote_addr: SocketAddr,
        timeouts: &Timeouts,
        guard: ConnectionGuard,
    ) -> Self {
        if !timeouts.keep_alive.is_zero() {
            if let Err(e) = socket::set_keep_alive(&stream, timeouts.keep_alive) {
                tracing::warn!(peer_addr = %remote_addr, error = %e, "Failed to enable keep-alive");
            }
        }

        Self {
            remote_addr,
            stream: ServerStream::new(stream, timeouts.read, timeouts.write),
            guard,
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    /// Run `handler` on this connection, then close it.
    ///
    /// A handler panic is logged and swallowed; an [`AbortHandler`] panic is
    /// swallowed silently. When `force` fires the handler is dropped
    /// mid-flight. The socket is shut down on every path.
    pub(crate) async fn serve<H: Handler>(mut self, handler: &H, ctx: ConnContext, force: &Shutdown) {
        tracing::debug!(connection_id = %self.id(), peer_addr = %self.remote_addr, "Serving connection");

        let outcome = {
            let stream = &mut self.stream;
            let serving =
                AssertUnwindSafe(async move { handler.serve(ctx, stream).await }).catch_unwind();
            tokio::select! {
                res = serving => Some(res),
                _ = force.wait() => None,
            }
        };

        match outcome {
            Some(Ok(())) => {}
            Some(Err(payload)) => self.report_panic(payload),
            None => {
                tracing::warn!(connection_id = %self.id(), peer_addr = %self.remote_addr, "Connection force-closed");
            }
        }

        self.close().await;
    }

    fn report_panic(&self, payload: Box<dyn Any + Send>) {
        if payload.is::<AbortHandler>() {
            return;
        }

        metrics::record_handler_panic();
        let backtrace = Backtrace::force_capture();
        tracing::error!(
            connection_id = %self.id(),
            peer_addr = %self.remote_addr,
            panic = %panic_message(payload.as_ref()),
            backtrace = %backtrace,
            "Handler panicked while serving connection"
        );
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!(connection_id = %self.id(), error = %e, "Error shutting down connection");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}
