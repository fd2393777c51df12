//! Connector abstraction
//!
//! A connector adapts one data source to a uniform lifecycle and a
//! capability-gated set of operations. Backends implement
//! [`ConnectorBackend`]; the [`Connector`] wrapper owns the source config,
//! enforces the capability gate and makes `initialize`/`shutdown` idempotent,
//! so call sites such as the pipeline runner never care which backend they
//! hold.

pub mod csv_file;
pub mod database;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sunerp_common::types::{Capability, CapabilitySet, DataSourceConfig};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};

pub use csv_file::CsvFileConnector;
pub use database::{DatabaseConnector, PgQueryExecutor, QueryExecutor, SqlParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

/// Outcome of a connection probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorHealth {
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// What a backend reports from a probe; the wrapper stamps the time
#[derive(Debug, Clone, PartialEq)]
pub struct HealthProbe {
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl HealthProbe {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            details: None,
        }
    }

    pub fn degraded(details: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            details: Some(details.into()),
        }
    }

    pub fn unavailable(details: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unavailable,
            details: Some(details.into()),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A record a connector could not process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub item: Value,
}

impl RecordError {
    pub fn new(message: impl Into<String>, item: Value) -> Self {
        Self {
            message: message.into(),
            item,
        }
    }
}

/// Output of a fetch or ingest
///
/// `records` is always present. A missing `cursor` means there is nothing
/// left to resume from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub records: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecordError>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SyncResult {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_errors(mut self, errors: Vec<RecordError>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Convert into the JSON payload pipeline stages pass along
    pub fn into_payload(self) -> Value {
        let mut payload = Map::new();
        payload.insert("records".to_string(), Value::Array(self.records));
        if let Some(cursor) = self.cursor {
            payload.insert("cursor".to_string(), Value::String(cursor));
        }
        if !self.errors.is_empty() {
            let errors = self
                .errors
                .into_iter()
                .map(|e| {
                    let mut entry = Map::new();
                    entry.insert("message".to_string(), Value::String(e.message));
                    if !e.item.is_null() {
                        entry.insert("item".to_string(), e.item);
                    }
                    Value::Object(entry)
                })
                .collect();
            payload.insert("errors".to_string(), Value::Array(errors));
        }
        payload.insert("metadata".to_string(), Value::Object(self.metadata));
        Value::Object(payload)
    }
}

/// Backend-specific half of a connector
///
/// Implementations receive the source config on every call and keep only the
/// resources they own (pools, handles). Capability checks and lifecycle
/// bookkeeping happen in [`Connector`], never here.
#[async_trait]
pub trait ConnectorBackend: Send + Sync {
    /// One-time setup; stateless backends keep the default
    async fn initialize(&self, _config: &DataSourceConfig) -> Result<()> {
        Ok(())
    }

    /// Probe the backend. Errors are turned into an unavailable status.
    async fn test_connection(&self, config: &DataSourceConfig) -> Result<HealthProbe>;

    async fn fetch(&self, config: &DataSourceConfig, context: &SyncContext) -> Result<SyncResult>;

    async fn ingest(
        &self,
        config: &DataSourceConfig,
        _context: &SyncContext,
        _payload: &Value,
    ) -> Result<SyncResult> {
        Err(SyncError::NotImplemented {
            connector: config.name.clone(),
            operation: "ingest",
        })
    }

    async fn fetch_metadata(&self, config: &DataSourceConfig) -> Result<Map<String, Value>>;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Created,
    Initialized,
    ShutDown,
}

/// A data source bound to its backend
pub struct Connector {
    config: DataSourceConfig,
    backend: Box<dyn ConnectorBackend>,
    state: Mutex<LifecycleState>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.config.name)
            .field("type", &self.config.source_type)
            .finish_non_exhaustive()
    }
}

impl Connector {
    pub fn new(config: DataSourceConfig, backend: impl ConnectorBackend + 'static) -> Self {
        Self {
            config,
            backend: Box::new(backend),
            state: Mutex::new(LifecycleState::Created),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.config.capabilities
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub async fn is_initialized(&self) -> bool {
        *self.state.lock().await == LifecycleState::Initialized
    }

    /// Run backend setup once; later calls return immediately
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == LifecycleState::Initialized {
            return Ok(());
        }

        self.backend
            .initialize(&self.config)
            .await
            .map_err(|e| SyncError::Initialization {
                connector: self.config.name.clone(),
                message: e.to_string(),
            })?;

        *state = LifecycleState::Initialized;
        info!(connector = %self.config.name, source_type = %self.config.source_type, "Connector initialized");
        Ok(())
    }

    /// Probe the backend without ever failing
    pub async fn test_connection(&self) -> ConnectorHealth {
        let probe = match self.backend.test_connection(&self.config).await {
            Ok(probe) => probe,
            Err(e) => HealthProbe::unavailable(e.to_string()),
        };

        ConnectorHealth {
            status: probe.status,
            details: probe.details,
            checked_at: Utc::now(),
        }
    }

    pub async fn fetch(&self, context: &SyncContext) -> Result<SyncResult> {
        self.require(Capability::Read)?;
        self.backend.fetch(&self.config, context).await
    }

    pub async fn ingest(&self, context: &SyncContext, payload: &Value) -> Result<SyncResult> {
        self.require(Capability::Write)?;
        self.backend.ingest(&self.config, context, payload).await
    }

    /// Best-effort metadata; empty when the capability is absent
    pub async fn fetch_metadata(&self) -> Result<Map<String, Value>> {
        if !self.config.has_capability(Capability::Metadata) {
            debug!(connector = %self.config.name, "Metadata capability absent, returning empty map");
            return Ok(Map::new());
        }
        self.backend.fetch_metadata(&self.config).await
    }

    /// Release backend resources; no-op unless initialized
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state != LifecycleState::Initialized {
            return Ok(());
        }

        self.backend.shutdown().await?;
        *state = LifecycleState::ShutDown;
        info!(connector = %self.config.name, "Connector shut down");
        Ok(())
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.config.has_capability(capability) {
            Ok(())
        } else {
            Err(SyncError::MissingCapability {
                connector: self.config.name.clone(),
                capability,
            })
        }
    }
}
