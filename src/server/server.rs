//! TCP server: accept loop, dispatch and shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::config::ServerSettings;
use crate::lifecycle::Shutdown;
use crate::net::connection::ServerConn;
use crate::net::{listener, ConnectionTracker, Timeouts};
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::server::{ConnContext, Handler, ServerError};

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// How long force-closed connections get to finish unwinding.
const FORCE_CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    NotStarted = 0,
    Listening = 1,
    Closed = 2,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::NotStarted,
            1 => ServerState::Listening,
            _ => ServerState::Closed,
        }
    }
}

/// Shared server state, reachable from every connection's [`ConnContext`].
#[derive(Debug)]
pub struct ServerInfo {
    addr: String,
    timeouts: Timeouts,
    state: AtomicU8,
    /// Stops the accept loop and cancels cooperative handlers.
    done: Shutdown,
    /// Drops handlers mid-flight once the drain grace has elapsed.
    force: Shutdown,
    base: Shutdown,
    tracker: ConnectionTracker,
    local_addr: watch::Sender<Option<SocketAddr>>,
    /// Number of listeners still owned by an accept loop.
    listeners: watch::Sender<usize>,
}

impl ServerInfo {
    /// The configured bind address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The bound address, once serving has started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.borrow()
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ServerState::Closed
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub(crate) fn done(&self) -> &Shutdown {
        &self.done
    }

    pub(crate) fn base_context(&self) -> &Shutdown {
        &self.base
    }

    /// Move to `Listening` unless the server was closed.
    fn mark_listening(&self) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != ServerState::Closed as u8).then_some(ServerState::Listening as u8)
            })
            .is_ok()
    }
}

/// Owns a listener for the duration of an accept loop.
///
/// Dropping it closes the socket before the listener count goes down, so
/// `close` only returns once dials are refused.
struct ListenerGuard<'a> {
    listener: Option<TcpListener>,
    listeners: &'a watch::Sender<usize>,
}

impl<'a> ListenerGuard<'a> {
    fn new(listener: TcpListener, listeners: &'a watch::Sender<usize>) -> Self {
        listeners.send_modify(|n| *n += 1);
        Self {
            listener: Some(listener),
            listeners,
        }
    }

    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        match &self.listener {
            Some(listener) => listener.accept().await,
            None => std::future::pending().await,
        }
    }
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        drop(self.listener.take());
        self.listeners.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// A TCP server dispatching every accepted connection to a [`Handler`].
///
/// Cheap to clone; clones share state, so one clone can run
/// [`Server::listen_and_serve`] while another calls [`Server::close`].
///
/// # Example
/// ```no_run
/// use netpool::server::{handlers::EchoHandler, Server};
///
/// # async fn run() -> Result<(), netpool::server::ServerError> {
/// let server = Server::builder("127.0.0.1:8000").handler(EchoHandler).build();
/// let running = server.clone();
/// tokio::spawn(async move { running.listen_and_serve().await });
/// // ...
/// server.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server<H> {
    info: Arc<ServerInfo>,
    handler: Arc<H>,
}

impl<H> Clone for Server<H> {
    fn clone(&self) -> Self {
        Self {
            info: Arc::clone(&self.info),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: Handler> Server<H> {
    pub fn builder(addr: impl Into<String>) -> ServerBuilder<H> {
        ServerBuilder::new(addr)
    }

    /// Bind the configured address and serve until closed.
    ///
    /// Returns [`ServerError::Closed`] without binding when the server was
    /// already closed.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        if self.info.is_closed() {
            return Err(ServerError::Closed);
        }
        if self.info.addr.is_empty() {
            return Err(ServerError::Config("empty address".to_string()));
        }

        let listener = listener::bind(&self.info.addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until the server is closed.
    ///
    /// Always ends with [`ServerError::Closed`] after a close; other accept
    /// failures are logged and retried with backoff.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let info = &self.info;
        let local_addr = listener.local_addr()?;

        let guard = ListenerGuard::new(listener, &info.listeners);
        if !info.mark_listening() {
            return Err(ServerError::Closed);
        }
        info.local_addr.send_replace(Some(local_addr));
        tracing::info!(address = %local_addr, "Server listening");

        let mut backoff = Backoff::new(ACCEPT_BACKOFF_BASE, ACCEPT_BACKOFF_MAX);

        loop {
            let accepted = tokio::select! {
                biased;
                _ = info.done.wait() => break,
                res = guard.accept() => res,
            };

            match accepted {
                Ok((stream, remote_addr)) => {
                    backoff.reset();
                    metrics::record_connection_accepted();
                    self.dispatch(stream, local_addr, remote_addr);
                }
                Err(e) => {
                    if info.done.is_triggered() {
                        break;
                    }
                    metrics::record_accept_error();
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Accept failed"
                    );
                    tokio::select! {
                        _ = info.done.wait() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        drop(guard);
        tracing::info!(address = %local_addr, "Server stopped accepting");
        Err(ServerError::Closed)
    }

    fn dispatch(&self, stream: TcpStream, local_addr: SocketAddr, remote_addr: SocketAddr) {
        let guard = self.info.tracker.track();
        let conn = ServerConn::wrap(stream, remote_addr, &self.info.timeouts, guard);
        let ctx = ConnContext::new(Arc::clone(&self.info), conn.id(), local_addr, remote_addr);

        tracing::debug!(connection_id = %conn.id(), peer_addr = %remote_addr, "Accepted connection");

        let handler = Arc::clone(&self.handler);
        let info = Arc::clone(&self.info);
        tokio::spawn(async move {
            conn.serve(handler.as_ref(), ctx, &info.force).await;
        });
    }

    /// Stop accepting and release the listener.
    ///
    /// Triggers the done signal, then waits until every accept loop has
    /// dropped its listener. In-flight connections keep running. Calling it
    /// again is a no-op.
    pub async fn close(&self) -> Result<(), ServerError> {
        let previous = ServerState::from_u8(
            self.info.state.swap(ServerState::Closed as u8, Ordering::SeqCst),
        );
        if self.info.done.trigger() {
            tracing::info!(addr = %self.info.addr, previous = ?previous, "Closing server");
        }

        let mut listeners = self.info.listeners.subscribe();
        // The sender lives in `self.info`, so this cannot fail.
        let _ = listeners.wait_for(|n| *n == 0).await;
        Ok(())
    }

    /// Close, then give in-flight connections `grace` to finish.
    ///
    /// Connections still running afterwards are force-closed and reported
    /// through [`ServerError::DrainTimeout`].
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ServerError> {
        self.close().await?;

        let tracker = &self.info.tracker;
        if tokio::time::timeout(grace, tracker.wait_idle()).await.is_ok() {
            tracing::info!("All connections drained");
            return Ok(());
        }

        let remaining = tracker.active_count();
        if remaining == 0 {
            return Ok(());
        }

        tracing::warn!(remaining, grace_ms = grace.as_millis() as u64, "Drain deadline passed, force-closing connections");
        self.info.force.trigger();
        if tokio::time::timeout(FORCE_CLOSE_WAIT, tracker.wait_idle()).await.is_err() {
            tracing::error!(remaining = tracker.active_count(), "Connections still open after force close");
        }

        Err(ServerError::DrainTimeout { remaining })
    }

    /// Wait until the server is listening and return its bound address.
    ///
    /// Returns early with whatever address was recorded if the server is
    /// closed first.
    pub async fn wait_listening(&self) -> Option<SocketAddr> {
        let mut rx = self.info.local_addr.subscribe();
        let bound = async { rx.wait_for(Option::is_some).await.ok().and_then(|addr| *addr) };
        tokio::select! {
            addr = bound => addr,
            _ = self.info.done.wait() => self.info.local_addr(),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.info.local_addr()
    }

    pub fn active_connections(&self) -> u64 {
        self.info.active_connections()
    }

    pub fn is_closed(&self) -> bool {
        self.info.is_closed()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H> std::fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.info.addr)
            .field("state", &self.info.state())
            .field("active_connections", &self.info.active_connections())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Server`].
#[derive(Debug)]
pub struct ServerBuilder<H> {
    addr: String,
    handler: Option<H>,
    timeouts: Timeouts,
    base: Option<Shutdown>,
}

impl<H: Handler> ServerBuilder<H> {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            handler: None,
            timeouts: Timeouts::default(),
            base: None,
        }
    }

    /// Start from the `[server]` section of the configuration file.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self::new(settings.bind_address.clone())
            .read_timeout(settings.read_timeout())
            .write_timeout(settings.write_timeout())
            .keep_alive_timeout(settings.keep_alive_timeout())
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Deadline for reads on each connection, measured from accept. Zero disables.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.read = timeout;
        self
    }

    /// Deadline for writes on each connection, measured from accept. Zero disables.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.write = timeout;
        self
    }

    /// TCP keep-alive idle time for accepted sockets. Zero leaves it off.
    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.keep_alive = timeout;
        self
    }

    /// Signal whose trigger cancels every handler's [`ConnContext`].
    pub fn base_context(mut self, base: Shutdown) -> Self {
        self.base = Some(base);
        self
    }

    /// # Panics
    ///
    /// Panics with "handler empty" when no handler was set.
    pub fn build(self) -> Server<H> {
        let handler = match self.handler {
            Some(handler) => handler,
            None => panic!("handler empty"),
        };

        let (local_addr, _) = watch::channel(None);
        let (listeners, _) = watch::channel(0);

        let info = ServerInfo {
            addr: self.addr,
            timeouts: self.timeouts,
            state: AtomicU8::new(ServerState::NotStarted as u8),
            done: Shutdown::new(),
            force: Shutdown::new(),
            base: self.base.unwrap_or_default(),
            tracker: ConnectionTracker::new(),
            local_addr,
            listeners,
        };

        Server {
            info: Arc::new(info),
            handler: Arc::new(handler),
        }
    }
}
