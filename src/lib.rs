//! Generic TCP connection pool and pluggable TCP server.
//!
//! - [`pool`]: bounded, health-checked reuse of outbound connections to one
//!   address, with creation and liveness delegated to a [`ConnectionFactory`]
//! - [`server`]: accept loop dispatching each inbound connection to a
//!   [`Handler`], with panic isolation and graceful shutdown

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod server;

pub use config::AppConfig;
pub use lifecycle::Shutdown;
pub use pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolError, TcpConnectionFactory};
pub use server::{ConnContext, Handler, Server, ServerError};
