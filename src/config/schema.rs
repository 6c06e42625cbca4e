//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every section falls back to defaults, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Inbound server settings.
    pub server: ServerSettings,

    /// Outbound connection pool settings.
    pub pool: PoolSettings,

    /// Upstream for the proxy handler.
    pub proxy: ProxySettings,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Which built-in handler the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Write every received byte back.
    #[default]
    Echo,
    /// Reply with a fixed greeting and close.
    Pong,
    /// Forward to the configured upstream through the pool.
    Proxy,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Echo => write!(f, "echo"),
            HandlerKind::Pong => write!(f, "pong"),
            HandlerKind::Proxy => write!(f, "proxy"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address (e.g., "127.0.0.1:8000").
    pub bind_address: String,

    /// Read deadline per connection in milliseconds (0 disables).
    pub read_timeout_ms: u64,

    /// Write deadline per connection in milliseconds (0 disables).
    pub write_timeout_ms: u64,

    /// TCP keep-alive idle time in milliseconds (0 disables).
    pub keep_alive_timeout_ms: u64,

    /// How long shutdown waits for in-flight connections.
    pub shutdown_grace_ms: u64,

    /// Handler to run for each connection.
    pub handler: HandlerKind,
}

impl ServerSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            keep_alive_timeout_ms: 0,
            shutdown_grace_ms: 5_000,
            handler: HandlerKind::Echo,
        }
    }
}

/// Connection pool configuration.
///
/// Zero counts select the documented defaults when the pool is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Connections opened when the pool is created.
    pub init_conn_num: usize,

    /// Maximum connections checked out at once.
    pub max_conn_num: usize,

    /// Maximum idle connections kept (0 = same as `init_conn_num`).
    pub max_idle_num: usize,

    /// Idle connection lifetime in milliseconds (0 disables eviction).
    pub idle_timeout_ms: u64,

    /// Dial timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            init_conn_num: 10,
            max_conn_num: 10,
            max_idle_num: 0,
            idle_timeout_ms: 0,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Proxy handler configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxySettings {
    /// Upstream address (e.g., "127.0.0.1:9000").
    pub upstream: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
