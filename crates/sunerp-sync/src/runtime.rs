//! Runtime assembly
//!
//! Wires the data source catalog, the connector registry with the built-in
//! factories, the pipeline catalog and the runner together.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use sunerp_common::types::DataSourceType;
use tracing::info;

use crate::config::{DatabaseConfig, SyncConfig};
use crate::connector::{Connector, CsvFileConnector, DatabaseConnector, PgQueryExecutor};
use crate::error::Result;
use crate::pipeline::{PipelineCatalog, PipelineExecutionResult, PipelineRunner};
use crate::registry::ConnectorRegistry;
use crate::sources::DataSourceCatalog;

/// Register the connectors shipped with the ERP
///
/// Every `internal-db` source gets its own lazily connected pool, so building
/// the connector never touches the network.
pub fn register_default_connectors(registry: &ConnectorRegistry, database: DatabaseConfig) {
    registry.register_connector(DataSourceType::InternalDb, move |config| {
        let executor = PgQueryExecutor::connect_lazy(&database)?;
        Ok(Connector::new(config, DatabaseConnector::new(Arc::new(executor))))
    });
    registry.register_connector(DataSourceType::CsvFile, |config| {
        Ok(Connector::new(config, CsvFileConnector::new()))
    });
}

pub struct SyncRuntime {
    pub registry: Arc<ConnectorRegistry>,
    pub runner: PipelineRunner,
}

impl SyncRuntime {
    /// Build everything from loaded configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let sources = Arc::new(DataSourceCatalog::load(&config.data_sources_path));
        let registry = Arc::new(ConnectorRegistry::new(sources));
        register_default_connectors(&registry, config.database.clone());

        Self::assemble(registry, config.stage_timeout())
    }

    /// Default pipelines over an already populated registry
    pub fn assemble(registry: Arc<ConnectorRegistry>, stage_timeout: Option<Duration>) -> Result<Self> {
        let pipelines = Arc::new(PipelineCatalog::default_catalog(Arc::clone(&registry))?);
        info!(
            sources = registry.sources().list().len(),
            pipelines = pipelines.list_pipelines().len(),
            "Sync runtime ready"
        );

        let runner = PipelineRunner::new(pipelines, Arc::clone(&registry)).with_stage_timeout(stage_timeout);
        Ok(Self { registry, runner })
    }

    pub fn pipelines(&self) -> &PipelineCatalog {
        self.runner.pipelines()
    }

    pub async fn run_pipeline(&self, name: &str, options: Map<String, Value>) -> Result<PipelineExecutionResult> {
        self.runner.run(name, options).await
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown_all_connectors().await;
    }
}
