//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where scripture rows and highlights live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL at the given URL.
    Postgres { database_url: String, max_connections: u32 },
    /// In-process sample data, for local development.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store: StoreBackend,
    pub log_level: Level,
    pub default_version: String,
    pub default_book_id: i64,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Store Settings ---
        let backend = var("STORE_BACKEND").unwrap_or_else(|| "postgres".to_string());
        let store = match backend.to_lowercase().as_str() {
            "postgres" => {
                let database_url = var("DATABASE_URL")
                    .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
                let max_connections = match var("DB_MAX_CONNECTIONS") {
                    Some(raw) => raw.parse::<u32>().map_err(|e| {
                        ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string(), e.to_string())
                    })?,
                    None => 5,
                };
                StoreBackend::Postgres { database_url, max_connections }
            }
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        // --- Reader Defaults ---
        let default_version = var("DEFAULT_VERSION")
            .map(|v| v.trim().to_uppercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| scripture_reader_core::DEFAULT_VERSION.to_string());
        let default_book_id = match var("DEFAULT_BOOK_ID") {
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                ConfigError::InvalidValue("DEFAULT_BOOK_ID".to_string(), e.to_string())
            })?,
            None => 1,
        };

        Ok(Self {
            bind_address,
            store,
            log_level,
            default_version,
            default_book_id,
            cors_origin,
        })
    }
}
