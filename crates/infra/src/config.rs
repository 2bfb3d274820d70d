//! Configuration loading and representation.
//!
//! Everything comes from environment variables; unset variables take the
//! defaults below, malformed ones are rejected.

use std::time::Duration;

use thiserror::Error;

use storefront_observability::LogFormat;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_ORDER_NUMBER_ATTEMPTS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> Result<&str, ConfigError> {
        self.url.as_deref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorefrontConfig {
    pub database: DatabaseConfig,
    pub log_format: LogFormat,
    /// How many order numbers checkout tries before giving up on collisions.
    pub order_number_attempts: u32,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            log_format: LogFormat::default(),
            order_number_attempts: DEFAULT_ORDER_NUMBER_ATTEMPTS,
        }
    }
}

impl StorefrontConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = DatabaseConfig::default();

        let max_connections =
            parse_u32(&lookup, "DB_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections);
        let min_connections =
            parse_u32(&lookup, "DB_MIN_CONNECTIONS")?.unwrap_or(defaults.min_connections);
        if max_connections == 0 {
            return Err(invalid("DB_MAX_CONNECTIONS", "0", "must be at least 1"));
        }
        if min_connections > max_connections {
            return Err(invalid(
                "DB_MIN_CONNECTIONS",
                &min_connections.to_string(),
                "must not exceed DB_MAX_CONNECTIONS",
            ));
        }

        let acquire_timeout = parse_u32(&lookup, "DB_ACQUIRE_TIMEOUT_MS")?
            .map(|ms| Duration::from_millis(u64::from(ms)))
            .unwrap_or(defaults.acquire_timeout);
        let idle_timeout = parse_u32(&lookup, "DB_IDLE_TIMEOUT_MS")?
            .map(|ms| Duration::from_millis(u64::from(ms)))
            .unwrap_or(defaults.idle_timeout);

        let log_format = match lookup("STOREFRONT_LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| invalid("STOREFRONT_LOG_FORMAT", &raw, "expected 'json' or 'pretty'"))?,
            None => LogFormat::default(),
        };

        let order_number_attempts = parse_u32(&lookup, "STOREFRONT_ORDER_NUMBER_ATTEMPTS")?
            .unwrap_or(DEFAULT_ORDER_NUMBER_ATTEMPTS);
        if order_number_attempts == 0 {
            return Err(invalid(
                "STOREFRONT_ORDER_NUMBER_ATTEMPTS",
                "0",
                "must be at least 1",
            ));
        }

        Ok(Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
                max_connections,
                min_connections,
                acquire_timeout,
                idle_timeout,
            },
            log_format,
            order_number_attempts,
        })
    }
}

fn parse_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u32>, ConfigError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u32>()
                .map_err(|e| invalid(key, &raw, &e.to_string()))
        })
        .transpose()
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
