//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use argon2::PasswordHash;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where tracking data lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// The single operator account that may log in. The password is held only
/// as an argon2 PHC string.
#[derive(Clone, Debug)]
pub struct OperatorCredentials {
    pub email: String,
    pub password_hash: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage_backend: StorageBackend,
    /// Always present for the Postgres backend.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_level: Level,
    /// Long-lived tokens for automation. May be empty when login is configured.
    pub operator_tokens: Vec<String>,
    pub operator_credentials: Option<OperatorCredentials>,
    pub operator_session_ttl: chrono::Duration,
    pub cors_origin: String,
    pub notify_webhook_url: Option<String>,
    pub storage_retry_attempts: u32,
    pub storage_retry_base_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Storage Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let storage_backend = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{other}' is not one of postgres, memory"),
                ))
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10u32)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Access Settings ---
        let operator_tokens: Vec<String> = lookup("OPERATOR_TOKENS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        let operator_email = lookup("OPERATOR_EMAIL")
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());
        let operator_password_hash = lookup("OPERATOR_PASSWORD_HASH")
            .map(|hash| hash.trim().to_string())
            .filter(|hash| !hash.is_empty());
        let operator_credentials = match (operator_email, operator_password_hash) {
            (Some(email), Some(password_hash)) => {
                PasswordHash::new(&password_hash).map_err(|e| {
                    ConfigError::InvalidValue("OPERATOR_PASSWORD_HASH".to_string(), e.to_string())
                })?;
                Some(OperatorCredentials { email, password_hash })
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingVar("OPERATOR_PASSWORD_HASH".to_string()))
            }
            (None, Some(_)) => return Err(ConfigError::MissingVar("OPERATOR_EMAIL".to_string())),
        };

        if operator_tokens.is_empty() && operator_credentials.is_none() {
            return Err(ConfigError::MissingVar(
                "OPERATOR_TOKENS or OPERATOR_EMAIL/OPERATOR_PASSWORD_HASH".to_string(),
            ));
        }

        let session_ttl_hours = parse_or(&lookup, "OPERATOR_SESSION_TTL_HOURS", 24i64)?;
        if session_ttl_hours <= 0 {
            return Err(ConfigError::InvalidValue(
                "OPERATOR_SESSION_TTL_HOURS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let operator_session_ttl = chrono::Duration::hours(session_ttl_hours);

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Load Adapter-specific Settings ---
        let notify_webhook_url = lookup("NOTIFY_WEBHOOK_URL").filter(|url| !url.trim().is_empty());

        let storage_retry_attempts = parse_or(&lookup, "STORAGE_RETRY_ATTEMPTS", 3u32)?;
        if storage_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "STORAGE_RETRY_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let storage_retry_base_delay =
            Duration::from_millis(parse_or(&lookup, "STORAGE_RETRY_BASE_DELAY_MS", 200u64)?);

        Ok(Self {
            bind_address,
            storage_backend,
            database_url,
            db_max_connections,
            log_level,
            operator_tokens,
            operator_credentials,
            operator_session_ttl,
            cors_origin,
            notify_webhook_url,
            storage_retry_attempts,
            storage_retry_base_delay,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
