//! Shared helpers for the sunerp-sync integration tests
//!
//! Provides an in-memory connector backend that counts lifecycle calls, a
//! query executor that records the SQL it receives, and CSV fixtures on disk.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sunerp_common::types::{Capability, DataSourceConfig, DataSourceType};
use sunerp_sync::connector::{ConnectorBackend, HealthProbe, QueryExecutor, SqlParam, SyncResult};
use sunerp_sync::error::Result;
use sunerp_sync::{DataSourceCatalog, SyncContext};

/// Lifecycle counters shared between a test and its [`CountingBackend`]
#[derive(Debug, Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub initialized: AtomicUsize,
    pub shutdown: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) -> usize {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Backend returning fixed records
pub struct CountingBackend {
    counters: Arc<Counters>,
    records: Vec<Value>,
}

impl CountingBackend {
    pub fn new(counters: Arc<Counters>, records: Vec<Value>) -> Self {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Self { counters, records }
    }
}

#[async_trait]
impl ConnectorBackend for CountingBackend {
    async fn initialize(&self, _config: &DataSourceConfig) -> Result<()> {
        // Yield so concurrent callers get a chance to interleave
        tokio::task::yield_now().await;
        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn test_connection(&self, _config: &DataSourceConfig) -> Result<HealthProbe> {
        Ok(HealthProbe::healthy())
    }

    async fn fetch(&self, _config: &DataSourceConfig, _context: &SyncContext) -> Result<SyncResult> {
        Ok(SyncResult::new(self.records.clone()))
    }

    async fn fetch_metadata(&self, config: &DataSourceConfig) -> Result<Map<String, Value>> {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!(config.name));
        Ok(metadata)
    }

    async fn shutdown(&self) -> Result<()> {
        self.counters.shutdown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Query executor that records every statement and replies with canned rows
#[derive(Default)]
pub struct RecordingExecutor {
    rows: Vec<Map<String, Value>>,
    pub calls: Mutex<Vec<(String, Vec<SqlParam>)>>,
    pub closed: AtomicUsize,
}

impl RecordingExecutor {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .filter_map(|row| row.as_object().cloned())
                .collect(),
            ..Self::default()
        }
    }

    pub fn last_call(&self) -> (String, Vec<SqlParam>) {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no query was executed")
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Map<String, Value>>> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(self.rows.clone())
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Query executor whose backend is unreachable
pub struct UnreachableExecutor;

#[async_trait]
impl QueryExecutor for UnreachableExecutor {
    async fn query(&self, _sql: &str, _params: &[SqlParam]) -> Result<Vec<Map<String, Value>>> {
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused").into())
    }
}

/// Write `contents` to `dir/name` and return the path
pub fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write CSV fixture");
    path
}

/// Header plus three valid lead rows
pub const LEADS_CSV: &str = "\
id,name,roof_type,desired_capacity_kwp,storage
L-1,Familie Berger,Satteldach,9.8,ja
L-2,Hofladen Kunz,flat,24,no
L-3,Kita Sonnenschein,mixed,15,yes
";

pub fn csv_source(name: &str, path: &Path) -> DataSourceConfig {
    DataSourceConfig::new(name, DataSourceType::CsvFile)
        .with_capabilities([Capability::Read, Capability::Metadata])
        .with_option("path", path.display().to_string())
}

pub fn stub_source(name: &str) -> DataSourceConfig {
    DataSourceConfig::new(name, DataSourceType::ExternalApi).with_capabilities([Capability::Read])
}

pub fn catalog(sources: Vec<DataSourceConfig>) -> Arc<DataSourceCatalog> {
    Arc::new(DataSourceCatalog::new(sources))
}
