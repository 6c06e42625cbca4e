//! Inbound TCP server.
//!
//! # Data Flow
//! ```text
//! Server::listen_and_serve
//!     → net::listener::bind
//!     → accept loop (races the done signal, backs off on accept errors)
//!     → one task per connection: ServerConn::serve → Handler::serve
//!
//! Server lifecycle:
//!     NotStarted → Listening → Closed
//! ```
//!
//! # Design Decisions
//! - `close` stops accepting and returns once the listener is gone; it never
//!   interrupts handlers
//! - `shutdown` adds a bounded drain, force-closing stragglers
//! - Handler panics are contained at the connection boundary

pub mod context;
pub mod error;
pub mod handler;
pub mod handlers;
#[allow(clippy::module_inception)]
pub mod server;

pub use context::ConnContext;
pub use error::ServerError;
pub use handler::{abort, AbortHandler, Handler};
pub use server::{Server, ServerBuilder, ServerInfo, ServerState};
