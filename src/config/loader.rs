//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerKind;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8000");
        assert_eq!(config.pool.init_conn_num, 10);
        assert_eq!(config.pool.max_conn_num, 10);
    }

    #[test]
    fn parses_all_sections() {
        let config = parse_config(
            r#"
            [server]
            bind_address = "0.0.0.0:7000"
            read_timeout_ms = 1500
            handler = "proxy"

            [pool]
            init_conn_num = 2
            max_conn_num = 4
            idle_timeout_ms = 30000

            [proxy]
            upstream = "127.0.0.1:9000"

            [observability]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.handler, HandlerKind::Proxy);
        assert_eq!(config.server.read_timeout().as_millis(), 1500);
        assert_eq!(config.server.write_timeout_ms, 0);
        assert_eq!(config.pool.max_conn_num, 4);
        assert_eq!(config.proxy.upstream.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn rejects_unknown_handler() {
        let err = parse_config("[server]\nhandler = \"http\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn surfaces_validation_errors() {
        let err = parse_config("[server]\nbind_address = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref v) if v.len() == 1));
        assert!(err.to_string().contains("server.bind_address"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/netpool.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
