//! Client-side connection pooling.
//!
//! # Data Flow
//! ```text
//! caller
//!     → ConnectionPool::acquire
//!         → idle queue (oldest first) → stale? close → ping fails? close
//!         → empty: under max_conns? → ConnectionFactory::new_connection
//!     ← connection
//!     → ConnectionPool::release → idle queue, or close when full
//! ```
//!
//! # Design Decisions
//! - One pool per remote address; the factory owns all transport details
//! - Health-check failures and stale evictions are absorbed, never returned
//! - Exhaustion fails fast; bounded waiting is opt-in

pub mod config;
pub mod connection_pool;
pub mod error;
pub mod factory;

pub use config::{PoolConfig, PoolLimits, DEFAULT_INIT_CONNS, DEFAULT_MAX_CONNS};
pub use connection_pool::{ConnectionPool, PoolStats};
pub use error::PoolError;
pub use factory::{ConnectionFactory, TcpConnectionFactory};
