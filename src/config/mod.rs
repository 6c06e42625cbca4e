//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → ServerBuilder / PoolConfig
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; pools and servers copy what they need
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, HandlerKind, ObservabilityConfig, PoolSettings, ProxySettings, ServerSettings,
};
pub use validation::ValidationError;
