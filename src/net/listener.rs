//! TCP listener binding.

use tokio::net::TcpListener;

use crate::server::ServerError;

/// Bind a listener to `addr` (host names are resolved).
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}
