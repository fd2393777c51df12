//! Connector registry
//!
//! Maps data source types to connector factories and keeps at most one live
//! connector per data source name. Lookup, construction and initialization
//! of a missing connector run under one async lock, so concurrent callers
//! asking for the same unseen name share a single instance.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use sunerp_common::types::{DataSourceConfig, DataSourceType};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::connector::{Connector, ConnectorHealth};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::sources::DataSourceCatalog;

/// Builds an uninitialized connector for a data source
pub type ConnectorFactory = Arc<dyn Fn(DataSourceConfig) -> Result<Connector> + Send + Sync>;

pub struct ConnectorRegistry {
    sources: Arc<DataSourceCatalog>,
    factories: RwLock<HashMap<DataSourceType, ConnectorFactory>>,
    instances: Mutex<HashMap<String, Arc<Connector>>>,
}

impl ConnectorRegistry {
    /// Registry with no factories registered
    pub fn new(sources: Arc<DataSourceCatalog>) -> Self {
        Self {
            sources,
            factories: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn sources(&self) -> &Arc<DataSourceCatalog> {
        &self.sources
    }

    /// Register the factory for `source_type`, replacing any previous one
    pub fn register_connector<F>(&self, source_type: DataSourceType, factory: F)
    where
        F: Fn(DataSourceConfig) -> Result<Connector> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.insert(source_type, Arc::new(factory)).is_some() {
            info!(%source_type, "Replaced connector factory");
        }
    }

    pub fn has_factory(&self, source_type: DataSourceType) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&source_type)
    }

    /// Return the live connector for `name`, creating and initializing it on first use
    pub async fn get_or_create_connector(&self, name: &str) -> Result<Arc<Connector>> {
        let mut instances = self.instances.lock().await;
        if let Some(connector) = instances.get(name) {
            return Ok(Arc::clone(connector));
        }

        let config = self
            .sources
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownDataSource(name.to_string()))?;

        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&config.source_type)
            .cloned()
            .ok_or(SyncError::UnknownConnectorType(config.source_type))?;

        let connector = Arc::new(factory(config)?);
        connector.initialize().await?;
        instances.insert(name.to_string(), Arc::clone(&connector));

        Ok(connector)
    }

    /// Shut every live connector down and forget them
    ///
    /// Shutdown failures are logged; the map is cleared regardless.
    pub async fn shutdown_all_connectors(&self) {
        let mut instances = self.instances.lock().await;
        for (name, connector) in instances.iter() {
            if let Err(e) = connector.shutdown().await {
                warn!(connector = %name, error = %e, "Connector shutdown failed");
            }
        }
        let count = instances.len();
        instances.clear();
        info!(count, "All connectors shut down");
    }

    /// Names of the connectors currently alive, sorted
    pub async fn active_connectors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe the connector for `name`, creating it if needed
    pub async fn check_health(&self, name: &str) -> Result<ConnectorHealth> {
        let connector = self.get_or_create_connector(name).await?;
        Ok(connector.test_connection().await)
    }

    /// Fresh context with a new run id
    pub fn create_sync_context(
        &self,
        source: &DataSourceConfig,
        options: Map<String, Value>,
    ) -> SyncContext {
        SyncContext::new(source.clone(), options)
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let factories: Vec<DataSourceType> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        f.debug_struct("ConnectorRegistry")
            .field("sources", &self.sources.names())
            .field("factories", &factories)
            .finish_non_exhaustive()
    }
}
