//! Pool configuration and normalisation.

use std::time::Duration;

use crate::config::PoolSettings;
use crate::pool::PoolError;

/// Default maximum number of connections.
pub const DEFAULT_MAX_CONNS: usize = 10;
/// Default number of connections created at construction.
pub const DEFAULT_INIT_CONNS: usize = 10;

/// Configuration for a [`ConnectionPool`](crate::pool::ConnectionPool).
///
/// Zero counts mean "use the default"; see [`PoolConfig::normalize`].
#[derive(Debug, Clone)]
pub struct PoolConfig<F> {
    /// Connections created when the pool is constructed.
    pub init_conns: usize,
    /// Upper bound on connections checked out at once.
    pub max_conns: usize,
    /// Upper bound on idle connections kept for reuse.
    pub max_idle: usize,
    /// Idle connections older than this are closed instead of reused.
    /// `Duration::ZERO` disables eviction.
    pub idle_timeout: Duration,
    /// Connection factory. Construction fails without one.
    pub factory: Option<F>,
}

impl<F> PoolConfig<F> {
    /// Create a config with every count defaulted.
    pub fn new(factory: F) -> Self {
        Self {
            init_conns: 0,
            max_conns: 0,
            max_idle: 0,
            idle_timeout: Duration::ZERO,
            factory: Some(factory),
        }
    }

    /// Build from file settings.
    pub fn from_settings(settings: &PoolSettings, factory: F) -> Self {
        Self {
            init_conns: settings.init_conn_num,
            max_conns: settings.max_conn_num,
            max_idle: settings.max_idle_num,
            idle_timeout: settings.idle_timeout(),
            factory: Some(factory),
        }
    }

    pub fn init_conns(mut self, n: usize) -> Self {
        self.init_conns = n;
        self
    }

    pub fn max_conns(mut self, n: usize) -> Self {
        self.max_conns = n;
        self
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Apply defaults and clamp limits, splitting off the factory.
    ///
    /// - `max_conns == 0` becomes [`DEFAULT_MAX_CONNS`]
    /// - `init_conns == 0` becomes [`DEFAULT_INIT_CONNS`], then is clamped to `max_conns`
    /// - `max_idle == 0` becomes `init_conns`, then is clamped to `max_conns`
    pub fn normalize(self) -> Result<(PoolLimits, F), PoolError> {
        let factory = self
            .factory
            .ok_or_else(|| PoolError::Config("connection factory is required".into()))?;

        let max_conns = if self.max_conns == 0 {
            DEFAULT_MAX_CONNS
        } else {
            self.max_conns
        };

        let init_conns = if self.init_conns == 0 {
            DEFAULT_INIT_CONNS
        } else {
            self.init_conns
        }
        .min(max_conns);

        let max_idle = if self.max_idle == 0 {
            init_conns
        } else {
            self.max_idle
        }
        .min(max_conns);

        Ok((
            PoolLimits {
                init_conns,
                max_conns,
                max_idle,
                idle_timeout: self.idle_timeout,
            },
            factory,
        ))
    }
}

/// Normalised, immutable pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub init_conns: usize,
    pub max_conns: usize,
    pub max_idle: usize,
    pub idle_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(init: usize, max: usize, idle: usize) -> PoolLimits {
        PoolConfig::new(())
            .init_conns(init)
            .max_conns(max)
            .max_idle(idle)
            .normalize()
            .unwrap()
            .0
    }

    #[test]
    fn zero_max_uses_default() {
        assert_eq!(limits(2, 0, 0).max_conns, DEFAULT_MAX_CONNS);
    }

    #[test]
    fn zero_idle_follows_init() {
        let l = limits(3, 5, 0);
        assert_eq!(l.max_idle, 3);
    }

    #[test]
    fn init_and_idle_clamped_to_max() {
        let l = limits(8, 4, 9);
        assert_eq!(l.init_conns, 4);
        assert_eq!(l.max_idle, 4);
    }

    #[test]
    fn all_defaults() {
        let l = limits(0, 0, 0);
        assert_eq!(l.max_conns, 10);
        assert_eq!(l.init_conns, 10);
        assert_eq!(l.max_idle, 10);
        assert_eq!(l.idle_timeout, Duration::ZERO);
    }

    #[test]
    fn missing_factory_is_config_error() {
        let config: PoolConfig<()> = PoolConfig {
            factory: None,
            ..PoolConfig::new(())
        };
        assert!(matches!(config.normalize(), Err(PoolError::Config(_))));
    }
}
