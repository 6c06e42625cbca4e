//! The connection handler capability.

use std::future::Future;

use crate::net::ServerStream;
use crate::server::ConnContext;

/// Protocol logic run for every accepted connection.
///
/// The server owns the stream and closes it after `serve` returns, panics,
/// or is force-cancelled, so implementations never need to close it
/// themselves. Errors are the handler's to log; panics are recovered by the
/// server and logged.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, ctx: ConnContext, conn: &mut ServerStream) -> impl Future<Output = ()> + Send;
}

/// Panic payload meaning "stop serving this connection, nothing went wrong".
///
/// Raise it with [`abort`]; the server closes the connection without
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortHandler;

/// Terminate the current handler invocation silently.
///
/// Unwinds with an [`AbortHandler`] payload without running the panic hook,
/// so nothing is printed.
pub fn abort() -> ! {
    std::panic::resume_unwind(Box::new(AbortHandler))
}
