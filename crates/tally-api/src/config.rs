use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Minimum length of the shared HS256 signing secret
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: String,
    pub auth_clock_skew: Duration,
    pub rate_limit_window: Duration,
    pub sync_rate_limit_per_window: u32,
    pub first_sync_rate_limit_per_window: u32,
    pub max_commands_per_batch: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_rate_limit_per_window",
                &self.sync_rate_limit_per_window,
            )
            .field(
                "first_sync_rate_limit_per_window",
                &self.first_sync_rate_limit_per_window,
            )
            .field("max_commands_per_batch", &self.max_commands_per_batch)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TALLY_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, "TALLY_DATABASE_PATH", "tally.db");

        let jwt_secret = required_trimmed(&lookup, "AUTH_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "AUTH_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        let jwt_issuer = optional_trimmed(&lookup, "AUTH_JWT_ISSUER");
        let jwt_audience = value_or_default(&lookup, "AUTH_JWT_AUDIENCE", "authenticated");

        let auth_clock_skew_secs =
            bounded_integer(&lookup, "AUTH_CLOCK_SKEW_SECS", "60", 0, 300)?;
        let rate_limit_window_secs =
            bounded_integer(&lookup, "RATE_LIMIT_WINDOW_SECS", "60", 10, 3_600)?;
        let sync_rate_limit_per_window =
            bounded_integer(&lookup, "SYNC_RATE_LIMIT_PER_WINDOW", "120", 1, 1_000)?;
        let first_sync_rate_limit_per_window =
            bounded_integer(&lookup, "FIRST_SYNC_RATE_LIMIT_PER_WINDOW", "10", 1, 1_000)?;
        let max_commands_per_batch =
            bounded_integer(&lookup, "SYNC_MAX_COMMANDS_PER_BATCH", "500", 1, 5_000)?;

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_rate_limit_per_window: u32::try_from(sync_rate_limit_per_window)
                .unwrap_or(u32::MAX),
            first_sync_rate_limit_per_window: u32::try_from(first_sync_rate_limit_per_window)
                .unwrap_or(u32::MAX),
            max_commands_per_batch: usize::try_from(max_commands_per_batch).unwrap_or(usize::MAX),
        })
    }
}

fn bounded_integer(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let value = value_or_default(lookup, name, default)
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]")))?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    tally_core::util::normalize_text_option(lookup(name))
}
