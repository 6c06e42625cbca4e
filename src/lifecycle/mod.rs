//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger process Shutdown
//!
//! Shutdown (shutdown.rs):
//!     trigger() → every waiter wakes → accept loops stop → drain → exit
//! ```
//!
//! # Design Decisions
//! - One signal type for every shutdown path (process, server, base context)
//! - Triggering is idempotent; only the first caller performs the transition
//! - Shutdown has a timeout: remaining connections are force-closed after it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
