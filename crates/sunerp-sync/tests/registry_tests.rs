//! Connector registry: single instance per source, lazy creation, shutdown

mod common;

use std::sync::Arc;

use common::{catalog, stub_source, Counters, CountingBackend};
use serde_json::{json, Map};
use sunerp_common::types::{Capability, DataSourceConfig, DataSourceType};
use sunerp_sync::connector::{Connector, HealthStatus};
use sunerp_sync::{ConnectorRegistry, SyncError};

fn registry_with_stub(sources: Vec<DataSourceConfig>, counters: &Arc<Counters>) -> ConnectorRegistry {
    let registry = ConnectorRegistry::new(catalog(sources));
    let counters = Arc::clone(counters);
    registry.register_connector(DataSourceType::ExternalApi, move |config| {
        Ok(Connector::new(
            config,
            CountingBackend::new(Arc::clone(&counters), vec![json!({ "id": 1 })]),
        ))
    });
    registry
}

#[tokio::test]
async fn test_same_name_returns_same_instance() {
    let counters = Arc::new(Counters::default());
    let registry = registry_with_stub(vec![stub_source("crm")], &counters);

    let first = registry.get_or_create_connector("crm").await.unwrap();
    let second = registry.get_or_create_connector("crm").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.initialized(), 1);
    assert!(first.is_initialized().await);
}

#[tokio::test]
async fn test_unknown_source_constructs_nothing() {
    let counters = Arc::new(Counters::default());
    let registry = registry_with_stub(vec![stub_source("crm")], &counters);

    let err = registry.get_or_create_connector("nope").await.unwrap_err();

    assert!(matches!(err, SyncError::UnknownDataSource(ref name) if name == "nope"));
    assert!(err.is_configuration());
    assert_eq!(counters.created(), 0);
    assert!(registry.active_connectors().await.is_empty());
}

#[tokio::test]
async fn test_unregistered_type_is_reported() {
    let counters = Arc::new(Counters::default());
    let leads = DataSourceConfig::new("leads", DataSourceType::CsvFile).with_capabilities([Capability::Read]);
    let registry = registry_with_stub(vec![leads], &counters);

    let err = registry.get_or_create_connector("leads").await.unwrap_err();

    assert!(matches!(err, SyncError::UnknownConnectorType(DataSourceType::CsvFile)));
    assert!(err.to_string().contains("csv-file"));
}

#[tokio::test]
async fn test_shutdown_all_then_recreate() {
    let counters = Arc::new(Counters::default());
    let registry = registry_with_stub(vec![stub_source("crm"), stub_source("erp-api")], &counters);

    let before = registry.get_or_create_connector("crm").await.unwrap();
    registry.get_or_create_connector("erp-api").await.unwrap();
    assert_eq!(registry.active_connectors().await, vec!["crm", "erp-api"]);

    registry.shutdown_all_connectors().await;
    assert_eq!(counters.shutdown(), 2);
    assert!(registry.active_connectors().await.is_empty());
    assert!(!before.is_initialized().await);

    let after = registry.get_or_create_connector("crm").await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.is_initialized().await);
    assert_eq!(counters.created(), 3);
}

#[tokio::test]
async fn test_factory_registration_last_wins() {
    let counters = Arc::new(Counters::default());
    let registry = registry_with_stub(vec![stub_source("crm")], &counters);

    let replacement = Arc::new(Counters::default());
    let factory_counters = Arc::clone(&replacement);
    registry.register_connector(DataSourceType::ExternalApi, move |config| {
        Ok(Connector::new(config, CountingBackend::new(Arc::clone(&factory_counters), Vec::new())))
    });

    registry.get_or_create_connector("crm").await.unwrap();
    assert_eq!(counters.created(), 0);
    assert_eq!(replacement.created(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_shares_one_instance() {
    let counters = Arc::new(Counters::default());
    let registry = Arc::new(registry_with_stub(vec![stub_source("crm")], &counters));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create_connector("crm").await })
        })
        .collect();

    let mut connectors = Vec::new();
    for handle in handles {
        connectors.push(handle.await.unwrap().unwrap());
    }

    assert!(connectors.iter().all(|c| Arc::ptr_eq(c, &connectors[0])));
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.initialized(), 1);
}

#[tokio::test]
async fn test_check_health_and_context() {
    let counters = Arc::new(Counters::default());
    let registry = registry_with_stub(vec![stub_source("crm")], &counters);

    let health = registry.check_health("crm").await.unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);

    let source = registry.sources().get("crm").cloned().unwrap();
    let mut options = Map::new();
    options.insert("cursor".to_string(), json!("abc"));
    let first = registry.create_sync_context(&source, options.clone());
    let second = registry.create_sync_context(&source, options);

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.cursor.as_deref(), Some("abc"));
    assert_eq!(first.source.name, "crm");
}
