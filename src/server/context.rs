//! Per-connection context handed to handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::lifecycle::Shutdown;
use crate::net::ConnectionId;
use crate::server::ServerInfo;

/// What a handler knows about the connection it is serving.
///
/// Carries a reference to the owning server for introspection and a
/// cooperative cancellation signal: [`ConnContext::cancelled`] resolves when
/// the server is closed or the base context supplied at build time fires.
#[derive(Debug, Clone)]
pub struct ConnContext {
    server: Arc<ServerInfo>,
    id: ConnectionId,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    base: Shutdown,
}

impl ConnContext {
    pub(crate) fn new(
        server: Arc<ServerInfo>,
        id: ConnectionId,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Self {
        let base = server.base_context().clone();
        Self {
            server,
            id,
            local_addr,
            remote_addr,
            base,
        }
    }

    /// The server that accepted this connection.
    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_cancelled(&self) -> bool {
        self.server.is_closed() || self.base.is_triggered()
    }

    /// Resolve once the handler should wind down.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.server.done().wait() => {}
            _ = self.base.wait() => {}
        }
    }
}
