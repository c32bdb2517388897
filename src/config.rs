use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ConfigError, LogPulseError};

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Immutable process-wide configuration, constructed once at startup and
/// passed to components by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub pool_max_connections: u32,
    pub pool_acquire_timeout: Duration,
    /// Hex-encoded SHA-256 digest of the pre-shared API key, if the
    /// embedding gateway delegates admission to this crate.
    pub api_key_hash: Option<String>,
    pub rate_limit_max: u64,
    pub rate_limit_window: Duration,
    pub environment: Environment,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".into()))?;

        let pool_max_connections = parse_var("POOL_MAX_CONNECTIONS", 20u32)?;
        let acquire_timeout_secs = parse_var("POOL_ACQUIRE_TIMEOUT_SECS", 5u64)?;
        let api_key_hash = env::var("API_KEY_HASH").ok();
        let rate_limit_max = parse_var("RATE_LIMIT_MAX", 1000u64)?;
        let rate_limit_window_ms = parse_var("RATE_LIMIT_WINDOW_MS", 60_000u64)?;
        let environment = env::var("LOGPULSE_ENV")
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            pool_max_connections,
            pool_acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            api_key_hash,
            rate_limit_max,
            rate_limit_window: Duration::from_millis(rate_limit_window_ms),
            environment,
        })
    }

    /// Returns the base Postgres URL.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|err: T::Err| ConfigError::InvalidEnvVar {
            key,
            message: err.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Helper that loads config and converts to the canonical error type.
pub fn load_config() -> Result<AppConfig, LogPulseError> {
    Ok(AppConfig::from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-wide, so both cases live in one
    // test to keep them off the parallel runner.
    #[test]
    fn loads_defaults_and_rejects_malformed_values() {
        env::set_var("DATABASE_URL", "postgres://example");
        env::remove_var("POOL_MAX_CONNECTIONS");
        env::remove_var("RATE_LIMIT_MAX");
        env::remove_var("LOGPULSE_ENV");

        let cfg = AppConfig::from_env().expect("config should load");
        assert_eq!(cfg.pool_max_connections, 20);
        assert_eq!(cfg.rate_limit_max, 1000);
        assert_eq!(cfg.rate_limit_window, Duration::from_millis(60_000));
        assert_eq!(cfg.environment, Environment::Development);

        env::set_var("POOL_MAX_CONNECTIONS", "not-a-number");
        let err = AppConfig::from_env().expect_err("config should fail");
        assert!(err.to_string().contains("POOL_MAX_CONNECTIONS"));
        env::remove_var("POOL_MAX_CONNECTIONS");
    }
}
