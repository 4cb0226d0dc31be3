//! Configuration module
//!
//! Env-driven configuration for the database, the key provider adapter and
//! the unattended batch runner. The provider licensing parameters live in an
//! explicit [`ProviderConfig`] object handed to the provider adapter at
//! startup; lifecycle code never reads the process environment directly.

use std::env;

use anyhow::{anyhow, Result};

// Defaults
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_TIMEOUT_SECS: u64 = 30;
const PROVIDER_TIMEOUT_SECS: u64 = 120;
const BATCH_INTERVAL_SECS: u64 = 3600;
const BATCH_WINDOW_DAYS: i64 = 7;

/// Base configuration shared by all components.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
}

/// Key provider adapter configuration, including the licensing and
/// diagnostic parameters the protocol library needs at registration time.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Licensee name registered with the protocol library vendor.
    pub license_user: Option<String>,
    /// License key registered with the protocol library vendor.
    pub license_key: Option<String>,
    /// Bound on every provider call; a timed-out call leaves the affected
    /// entity in its prior state.
    pub timeout_seconds: u64,
}

/// Unattended batch runner configuration.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Seconds between scheduled runs. 0 = run once and stop.
    pub interval_seconds: u64,
    /// Default download window when the trigger passes no explicit dates.
    pub window_days: i64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub provider: ProviderConfig,
    pub batch: BatchConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow!("DATABASE_URL environment variable is required"))?;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            base: BaseConfig {
                database_url,
                db_max_connections: env_parse("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
                db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", DB_TIMEOUT_SECS)?,
                environment,
            },
            provider: ProviderConfig {
                license_user: env::var("EBICS_LICENSE_USER").ok(),
                license_key: env::var("EBICS_LICENSE_KEY").ok(),
                timeout_seconds: env_parse("EBICS_PROVIDER_TIMEOUT_SECS", PROVIDER_TIMEOUT_SECS)?,
            },
            batch: BatchConfig {
                interval_seconds: env_parse("BATCH_INTERVAL_SECS", BATCH_INTERVAL_SECS)?,
                window_days: env_parse("BATCH_WINDOW_DAYS", BATCH_WINDOW_DAYS)?,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn database_url(&self) -> &str {
        &self.base.database_url
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}
