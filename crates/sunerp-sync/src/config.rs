//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default location of the external data source list.
pub const DEFAULT_DATA_SOURCES_PATH: &str = "config/data-sources.json";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/sunerp";

/// Default maximum database connections per connector pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Integration layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// JSON file merged over the built-in data sources
    pub data_sources_path: PathBuf,
    pub database: DatabaseConfig,
    /// Upper bound for a single pipeline stage; `None` waits indefinitely
    pub stage_timeout_secs: Option<u64>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl SyncConfig {
    /// Load configuration from environment and defaults
    ///
    /// Environment variables:
    /// - `DATA_SOURCES_CONFIG`: path of the data source JSON file
    /// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT`
    /// - `SYNC_STAGE_TIMEOUT_SECS`: per-stage timeout, unset for none
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = SyncConfig {
            data_sources_path: std::env::var("DATA_SOURCES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_SOURCES_PATH)),
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            stage_timeout_secs: std::env::var("SYNC_STAGE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(SyncError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.stage_timeout_secs == Some(0) {
            return Err(SyncError::Config(
                "SYNC_STAGE_TIMEOUT_SECS must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_sources_path: PathBuf::from(DEFAULT_DATA_SOURCES_PATH),
            database: DatabaseConfig::default(),
            stage_timeout_secs: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "DATA_SOURCES_CONFIG",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "DATABASE_CONNECT_TIMEOUT",
        "SYNC_STAGE_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        clear_env();
        let config = SyncConfig::load().unwrap();

        assert_eq!(config.data_sources_path, PathBuf::from(DEFAULT_DATA_SOURCES_PATH));
        assert_eq!(config.database.max_connections, DEFAULT_DATABASE_MAX_CONNECTIONS);
        assert!(config.stage_timeout().is_none());
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        clear_env();
        std::env::set_var("DATA_SOURCES_CONFIG", "/etc/sunerp/sources.json");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "3");
        std::env::set_var("SYNC_STAGE_TIMEOUT_SECS", "90");

        let config = SyncConfig::load().unwrap();
        clear_env();

        assert_eq!(config.data_sources_path, PathBuf::from("/etc/sunerp/sources.json"));
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.stage_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    #[serial]
    fn test_zero_stage_timeout_is_rejected() {
        clear_env();
        std::env::set_var("SYNC_STAGE_TIMEOUT_SECS", "0");
        let result = SyncConfig::load();
        clear_env();

        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = SyncConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
