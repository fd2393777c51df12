//! CSV file connector
//!
//! Streams a delimited file with a header row and turns every data row into
//! a JSON object keyed by header. Typical input is a lead export from a
//! web form or a partner portal.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use sunerp_common::types::DataSourceConfig;
use tracing::debug;

use super::{ConnectorBackend, HealthProbe, RecordError, SyncResult};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};

/// Rows read per fetch when no `limit` option is given
pub const DEFAULT_ROW_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvOptions {
    #[serde(default)]
    path: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    delimiter: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

impl CsvOptions {
    fn parse(connector: &str, options: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(options))
            .map_err(|e| SyncError::invalid_option(connector, e.to_string()))
    }

    fn resolved_path(&self, connector: &str) -> Result<PathBuf> {
        let path = self.path.as_deref().ok_or_else(|| SyncError::MissingOption {
            connector: connector.to_string(),
            key: "path",
        })?;
        Ok(std::path::absolute(Path::new(path))?)
    }

    fn delimiter_byte(&self, connector: &str) -> Result<u8> {
        match self.delimiter.as_deref() {
            None => Ok(b','),
            Some(d) if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
            Some("\\t") => Ok(b'\t'),
            Some(other) => Err(SyncError::invalid_option(
                connector,
                format!("delimiter must be a single ASCII character, got '{other}'"),
            )),
        }
    }
}

/// Map one data row onto the headers; describes the problem for rejected rows
fn row_to_record(
    headers: &[String],
    row: &csv_async::ByteRecord,
) -> std::result::Result<Map<String, Value>, String> {
    if row.len() != headers.len() {
        return Err(format!("expected {} fields, found {}", headers.len(), row.len()));
    }

    headers
        .iter()
        .zip(row.iter())
        .enumerate()
        .map(|(idx, (header, field))| {
            let value = std::str::from_utf8(field)
                .map_err(|_| format!("field {} ({header}) is not valid UTF-8", idx + 1))?;
            Ok((header.clone(), Value::String(value.to_string())))
        })
        .collect()
}

/// Connector reading a local CSV file
#[derive(Debug, Default)]
pub struct CsvFileConnector;

impl CsvFileConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectorBackend for CsvFileConnector {
    async fn test_connection(&self, config: &DataSourceConfig) -> Result<HealthProbe> {
        let options = CsvOptions::parse(&config.name, config.options.clone())?;
        let path = options.resolved_path(&config.name)?;

        match tokio::fs::metadata(&path).await {
            Ok(stat) if stat.len() == 0 => {
                Ok(HealthProbe::degraded(format!("file is empty: {}", path.display())))
            },
            Ok(_) => Ok(HealthProbe::healthy().with_details(path.display().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(HealthProbe::unavailable(format!("file not found: {}", path.display())))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, config: &DataSourceConfig, context: &SyncContext) -> Result<SyncResult> {
        let options = CsvOptions::parse(&config.name, context.merged_options())?;
        let path = options.resolved_path(&config.name)?;
        let delimiter = options.delimiter_byte(&config.name)?;

        if !tokio::fs::try_exists(&path).await? {
            return Err(SyncError::FileNotFound(path));
        }

        debug!(connector = %config.name, run_id = %context.run_id, path = %path.display(), limit = options.limit, "Reading CSV file");

        let file = tokio::fs::File::open(&path).await?;
        let mut reader = csv_async::AsyncReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .create_reader(file);

        let headers: Vec<String> = reader
            .byte_headers()
            .await?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();
        let mut rows = reader.byte_records();
        let mut records = Vec::new();
        let mut errors = Vec::new();

        // Every data row counts against the limit, rejected ones included
        let mut rows_read = 0usize;
        while rows_read < options.limit {
            let Some(row) = rows.next().await else {
                break;
            };
            let row = row?;
            rows_read += 1;

            let line = row.position().map(|p| p.line()).unwrap_or_default();
            match row_to_record(&headers, &row) {
                Ok(record) => records.push(Value::Object(record)),
                Err(message) => errors.push(RecordError::new(
                    format!("line {line}: {message}"),
                    Value::Array(
                        row.iter()
                            .map(|f| Value::String(String::from_utf8_lossy(f).into_owned()))
                            .collect(),
                    ),
                )),
            }
        }

        let row_count = records.len();
        Ok(SyncResult::new(records)
            .with_errors(errors)
            .with_metadata("path", path.display().to_string())
            .with_metadata("rows", row_count))
    }

    async fn fetch_metadata(&self, config: &DataSourceConfig) -> Result<Map<String, Value>> {
        let options = CsvOptions::parse(&config.name, config.options.clone())?;
        let mut metadata = Map::new();

        if options.path.is_none() {
            metadata.insert("path".to_string(), Value::Null);
            metadata.insert("size".to_string(), Value::from(0));
            metadata.insert("modifiedAt".to_string(), Value::Null);
            return Ok(metadata);
        }

        let path = options.resolved_path(&config.name)?;
        metadata.insert("path".to_string(), Value::String(path.display().to_string()));
        match tokio::fs::metadata(&path).await {
            Ok(stat) => {
                let modified = stat
                    .modified()
                    .ok()
                    .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
                metadata.insert("size".to_string(), Value::from(stat.len()));
                metadata.insert(
                    "modifiedAt".to_string(),
                    modified.map(Value::String).unwrap_or(Value::Null),
                );
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                metadata.insert("size".to_string(), Value::from(0));
                metadata.insert("modifiedAt".to_string(), Value::Null);
            },
            Err(e) => return Err(e.into()),
        }

        Ok(metadata)
    }
}
