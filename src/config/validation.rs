//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses parse and required fields are present
//! - Check pool limits are consistent
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: AppConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{AppConfig, HandlerKind};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is not a valid host:port address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("pool.init_conn_num ({init}) exceeds pool.max_conn_num ({max})")]
    InitExceedsMax { init: usize, max: usize },

    #[error("pool.max_idle_num ({idle}) exceeds pool.max_conn_num ({max})")]
    IdleExceedsMax { idle: usize, max: usize },

    #[error("proxy.upstream is required when server.handler is \"proxy\"")]
    MissingUpstream,
}

/// Whether `addr` has the `host:port` shape accepted by bind and connect.
///
/// Host names are not resolved here; that happens when the socket is opened.
fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let bind = config.server.bind_address.trim();
    if bind.is_empty() {
        errors.push(ValidationError::Empty {
            field: "server.bind_address",
        });
    } else if !is_host_port(bind) {
        errors.push(ValidationError::InvalidAddress {
            field: "server.bind_address",
            value: bind.to_string(),
        });
    }

    let pool = &config.pool;
    if pool.max_conn_num > 0 && pool.init_conn_num > pool.max_conn_num {
        errors.push(ValidationError::InitExceedsMax {
            init: pool.init_conn_num,
            max: pool.max_conn_num,
        });
    }
    if pool.max_conn_num > 0 && pool.max_idle_num > pool.max_conn_num {
        errors.push(ValidationError::IdleExceedsMax {
            idle: pool.max_idle_num,
            max: pool.max_conn_num,
        });
    }

    match config.proxy.upstream.as_deref().map(str::trim) {
        None | Some("") if config.server.handler == HandlerKind::Proxy => {
            errors.push(ValidationError::MissingUpstream);
        }
        Some(upstream) if !upstream.is_empty() && !is_host_port(upstream) => {
            errors.push(ValidationError::InvalidAddress {
                field: "proxy.upstream",
                value: upstream.to_string(),
            });
        }
        _ => {}
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = AppConfig::default();
        config.server.bind_address = String::new();
        config.server.handler = HandlerKind::Proxy;
        config.pool.init_conn_num = 20;
        config.pool.max_conn_num = 5;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::Empty {
            field: "server.bind_address"
        }));
        assert!(errors.contains(&ValidationError::MissingUpstream));
        assert!(errors.contains(&ValidationError::InitExceedsMax { init: 20, max: 5 }));
    }

    #[test]
    fn zero_max_skips_limit_checks() {
        let mut config = AppConfig::default();
        config.pool.max_conn_num = 0;
        config.pool.init_conn_num = 50;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn accepts_host_names() {
        let mut config = AppConfig::default();
        config.server.bind_address = "localhost:8000".into();
        config.server.handler = HandlerKind::Proxy;
        config.proxy.upstream = Some("db.internal:9000".into());
        assert!(validate_config(&config).is_ok());

        config.server.bind_address = "[::1]:8000".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_missing_or_bad_port() {
        let mut config = AppConfig::default();
        config.server.bind_address = "localhost".into();
        config.proxy.upstream = Some("db.internal:99999".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::InvalidAddress { .. })));
    }

    #[test]
    fn rejects_bad_upstream() {
        let mut config = AppConfig::default();
        config.proxy.upstream = Some("not-an-addr".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::InvalidAddress {
                field: "proxy.upstream",
                ..
            }
        ));
    }
}
