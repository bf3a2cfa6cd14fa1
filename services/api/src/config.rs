//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Signing keys shorter than this are refused.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where questions, answers, users and sessions live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Controls how much error detail reaches the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub environment: Environment,
    pub log_level: Level,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub session_cookie_name: String,
    pub session_secret: String,
    pub session_ttl: chrono::Duration,
    pub upload_dir: PathBuf,
    pub upload_tmp_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
    pub push_heartbeat: Duration,
    pub session_sweep: Duration,
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

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let environment = match var_or("APP_ENV", "development").to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "production" | "prod" => Environment::Production,
            other => {
                return Err(ConfigError::InvalidValue(
                    "APP_ENV".to_string(),
                    format!("'{}' is not one of development, production", other),
                ))
            }
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Storage Settings ---
        let storage_backend = match var_or("STORAGE_BACKEND", "postgres").to_lowercase().as_str() {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        let database_url = lookup("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        // --- Session Settings ---
        // The HTTP layer and the push gateway both read these two values.
        let session_cookie_name = var_or("SESSION_COOKIE_NAME", "qa.sid");
        if session_cookie_name.is_empty()
            || session_cookie_name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, ';' | '=' | ','))
        {
            return Err(ConfigError::InvalidValue(
                "SESSION_COOKIE_NAME".to_string(),
                format!("'{}' is not a valid cookie name", session_cookie_name),
            ));
        }

        let session_secret = lookup("SESSION_SECRET")
            .ok_or_else(|| ConfigError::MissingVar("SESSION_SECRET".to_string()))?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "SESSION_SECRET".to_string(),
                format!("must be at least {} bytes", MIN_SESSION_SECRET_LEN),
            ));
        }

        let session_ttl_days = parse_number::<i64>(&lookup, "SESSION_TTL_DAYS", 30)?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }
        // Expiry timestamps are `now + ttl`, which must stay representable.
        let session_ttl = chrono::Duration::try_days(session_ttl_days)
            .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SESSION_TTL_DAYS".to_string(),
                    format!("{} days is out of range", session_ttl_days),
                )
            })?;

        // --- Upload Settings ---
        let upload_dir = PathBuf::from(var_or("UPLOAD_DIR", "./public/images/uploads"));
        let upload_tmp_dir = PathBuf::from(var_or("UPLOAD_TMP_DIR", "./tmp"));
        let max_upload_bytes =
            parse_number::<usize>(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");
        let heartbeat_secs = parse_number::<u64>(&lookup, "PUSH_HEARTBEAT_SECS", 30)?;
        let sweep_secs = parse_number::<u64>(&lookup, "SESSION_SWEEP_SECS", 3600)?;

        Ok(Self {
            bind_address,
            environment,
            log_level,
            storage_backend,
            database_url,
            session_cookie_name,
            session_secret,
            session_ttl,
            upload_dir,
            upload_tmp_dir,
            max_upload_bytes,
            cors_origin,
            push_heartbeat: Duration::from_secs(heartbeat_secs.max(1)),
            session_sweep: Duration::from_secs(sweep_secs.max(1)),
        })
    }

    pub fn exposes_error_details(&self) -> bool {
        self.environment != Environment::Production
    }
}

fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn memory_backend_needs_no_database_url() {
        let config = load(&[("STORAGE_BACKEND", "memory"), ("SESSION_SECRET", SECRET)]).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.session_cookie_name, "qa.sid");
        assert_eq!(config.session_ttl, chrono::Duration::days(30));
        assert!(config.exposes_error_details());
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let err = load(&[("SESSION_SECRET", SECRET)]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(v) if v == "DATABASE_URL"));
    }

    #[test]
    fn session_secret_is_required_and_must_be_long() {
        let err = load(&[("STORAGE_BACKEND", "memory")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(v) if v == "SESSION_SECRET"));

        let err = load(&[("STORAGE_BACKEND", "memory"), ("SESSION_SECRET", "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(v, _) if v == "SESSION_SECRET"));
    }

    #[test]
    fn rejects_cookie_names_with_separators() {
        let err = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("SESSION_SECRET", SECRET),
            ("SESSION_COOKIE_NAME", "a;b"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(v, _) if v == "SESSION_COOKIE_NAME"));
    }

    #[test]
    fn production_hides_error_details() {
        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("SESSION_SECRET", SECRET),
            ("APP_ENV", "production"),
        ])
        .unwrap();
        assert!(!config.exposes_error_details());
    }

    #[test]
    fn out_of_range_session_ttl_is_rejected() {
        for days in ["9223372036854775807", "100000000"] {
            let err = load(&[
                ("STORAGE_BACKEND", "memory"),
                ("SESSION_SECRET", SECRET),
                ("SESSION_TTL_DAYS", days),
            ])
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(v, _) if v == "SESSION_TTL_DAYS"));
        }
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("SESSION_SECRET", SECRET),
            ("MAX_UPLOAD_BYTES", "lots"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(v, _) if v == "MAX_UPLOAD_BYTES"));
    }
}
