//! Error types for the integration layer
//!
//! Configuration and capability failures are raised before any I/O happens
//! and name the offending source, connector type or pipeline so the message
//! is actionable on its own.

use std::path::PathBuf;

use sunerp_common::types::{Capability, DataSourceType};
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No such data source: '{0}'")]
    UnknownDataSource(String),

    #[error("No connector registered for type '{0}'")]
    UnknownConnectorType(DataSourceType),

    #[error("No such pipeline: '{0}'")]
    UnknownPipeline(String),

    #[error("Pipeline '{0}' is disabled")]
    PipelineDisabled(String),

    #[error("Connector '{connector}' lacks the '{capability}' capability")]
    MissingCapability {
        connector: String,
        capability: Capability,
    },

    #[error("Operation '{operation}' is not implemented by connector '{connector}'")]
    NotImplemented {
        connector: String,
        operation: &'static str,
    },

    #[error("Connector '{connector}' requires option '{key}'")]
    MissingOption { connector: String, key: &'static str },

    #[error("Invalid options for connector '{connector}': {message}")]
    InvalidOption { connector: String, message: String },

    #[error("CSV file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to initialize connector '{connector}': {message}")]
    Initialization { connector: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv_async::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub fn invalid_option(connector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            connector: connector.into(),
            message: message.into(),
        }
    }

    /// True for failures raised while resolving names, before any I/O
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::UnknownDataSource(_)
                | SyncError::UnknownConnectorType(_)
                | SyncError::UnknownPipeline(_)
                | SyncError::PipelineDisabled(_)
                | SyncError::Config(_)
        )
    }
}
