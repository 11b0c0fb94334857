//! Engine and database configuration, read from environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const STORE_TIMEOUT_MS: &str = "BILLBOOK_STORE_TIMEOUT_MS";
pub const MAX_CONFLICT_RETRIES: &str = "BILLBOOK_MAX_CONFLICT_RETRIES";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
pub const DATABASE_ACQUIRE_TIMEOUT_MS: &str = "DATABASE_ACQUIRE_TIMEOUT_MS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

/// Knobs for [`crate::BillingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on one whole operation, retries included.
    pub store_timeout: Duration,
    /// How many times a serialization conflict is retried before surfacing.
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(5_000),
            max_conflict_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timeout_ms = parse_var(
            &lookup,
            STORE_TIMEOUT_MS,
            defaults.store_timeout.as_millis() as u64,
        )?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                var: STORE_TIMEOUT_MS,
                value: "0".to_string(),
            });
        }
        Ok(Self {
            store_timeout: Duration::from_millis(timeout_ms),
            max_conflict_retries: parse_var(
                &lookup,
                MAX_CONFLICT_RETRIES,
                defaults.max_conflict_retries,
            )?,
        })
    }
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_millis(5_000),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL))?;
        let defaults = Self::new(url);
        Ok(Self {
            max_connections: parse_var(&lookup, DATABASE_MAX_CONNECTIONS, defaults.max_connections)?,
            acquire_timeout: Duration::from_millis(parse_var(
                &lookup,
                DATABASE_ACQUIRE_TIMEOUT_MS,
                defaults.acquire_timeout.as_millis() as u64,
            )?),
            ..defaults
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn engine_defaults_apply_when_unset() {
        let config = EngineConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn engine_reads_overrides() {
        let config = EngineConfig::from_lookup(env(&[
            (STORE_TIMEOUT_MS, "250"),
            (MAX_CONFLICT_RETRIES, "0"),
        ]))
        .unwrap();
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.max_conflict_retries, 0);
    }

    #[test]
    fn rejects_garbage_and_zero_timeout() {
        let err = EngineConfig::from_lookup(env(&[(STORE_TIMEOUT_MS, "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: STORE_TIMEOUT_MS,
                value: "soon".to_string()
            }
        );
        assert!(EngineConfig::from_lookup(env(&[(STORE_TIMEOUT_MS, "0")])).is_err());
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(
            DatabaseConfig::from_lookup(env(&[])).unwrap_err(),
            ConfigError::Missing(DATABASE_URL)
        );

        let config = DatabaseConfig::from_lookup(env(&[
            (DATABASE_URL, "postgres://localhost/billbook"),
            (DATABASE_MAX_CONNECTIONS, "4"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }
}
