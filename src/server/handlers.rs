//! Built-in handlers.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::net::ServerStream;
use crate::pool::{ConnectionFactory, ConnectionPool};
use crate::server::{ConnContext, Handler};

/// Reply written by [`PongHandler`].
pub const PONG_REPLY: &[u8] = b"Pong!TCP handler here.\n";

const ECHO_BUFFER_SIZE: usize = 8 * 1024;

/// Writes every received byte back until the peer closes.
///
/// Stops early when the connection context is cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    async fn serve(&self, ctx: ConnContext, conn: &mut ServerStream) {
        let mut buf = vec![0u8; ECHO_BUFFER_SIZE];
        loop {
            let n = tokio::select! {
                res = conn.read(&mut buf) => match res {
                    Ok(0) => return,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(connection_id = %ctx.connection_id(), error = %e, "Echo read failed");
                        return;
                    }
                },
                _ = ctx.cancelled() => return,
            };

            if let Err(e) = conn.write_all(&buf[..n]).await {
                tracing::debug!(connection_id = %ctx.connection_id(), error = %e, "Echo write failed");
                return;
            }
        }
    }
}

/// Replies with [`PONG_REPLY`] and returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PongHandler;

impl Handler for PongHandler {
    async fn serve(&self, ctx: ConnContext, conn: &mut ServerStream) {
        if let Err(e) = conn.write_all(PONG_REPLY).await {
            tracing::debug!(connection_id = %ctx.connection_id(), error = %e, "Pong write failed");
        }
    }
}

/// Forwards each connection to one upstream through a connection pool.
///
/// Upstream connections are discarded after use: once either side has
/// half-closed, the stream cannot be handed to another client.
pub struct ProxyHandler<F: ConnectionFactory<Connection = TcpStream>> {
    pool: Arc<ConnectionPool<F>>,
}

impl<F: ConnectionFactory<Connection = TcpStream>> ProxyHandler<F> {
    pub fn new(pool: Arc<ConnectionPool<F>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<F>> {
        &self.pool
    }
}

impl<F: ConnectionFactory<Connection = TcpStream>> Handler for ProxyHandler<F> {
    async fn serve(&self, ctx: ConnContext, conn: &mut ServerStream) {
        let mut upstream = match self.pool.acquire().await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(
                    connection_id = %ctx.connection_id(),
                    upstream = %self.pool.addr(),
                    error = %e,
                    "No upstream connection available"
                );
                return;
            }
        };

        tokio::select! {
            res = tokio::io::copy_bidirectional(conn, &mut upstream) => match res {
                Ok((to_upstream, to_client)) => {
                    tracing::debug!(
                        connection_id = %ctx.connection_id(),
                        to_upstream,
                        to_client,
                        "Proxied connection finished"
                    );
                }
                Err(e) => {
                    tracing::debug!(connection_id = %ctx.connection_id(), error = %e, "Proxy copy failed");
                }
            },
            _ = ctx.cancelled() => {
                tracing::debug!(connection_id = %ctx.connection_id(), "Proxied connection cancelled");
            }
        }

        self.pool.discard(upstream).await;
    }
}

impl<F: ConnectionFactory<Connection = TcpStream>> std::fmt::Debug for ProxyHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandler")
            .field("upstream", &self.pool.addr())
            .finish()
    }
}
