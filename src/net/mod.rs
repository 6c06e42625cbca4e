//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind)
//!     → socket.rs (keep-alive)
//!     → stream.rs (read/write deadlines)
//!     → connection.rs (id, drain tracking, panic-safe handler run)
//!     → Handler
//!
//! Connection lifecycle:
//!     Accepted → Wrapped → Serving → Closed
//! ```
//!
//! # Design Decisions
//! - Deadlines are fixed at accept time from static configuration
//! - Each connection is tracked so shutdown can drain it
//! - The socket is shut down on every exit path, including handler panics

pub mod connection;
pub mod listener;
pub mod socket;
pub mod stream;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, Timeouts};
pub use stream::DeadlineStream;

/// The stream type handlers receive.
pub type ServerStream = DeadlineStream<tokio::net::TcpStream>;
