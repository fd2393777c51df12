//! Database connector
//!
//! Reads rows from the ERP's relational store. The SQL is executed through a
//! [`QueryExecutor`], so the connector only decides *what* to select; the
//! PostgreSQL executor below decides how rows come back as JSON.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sunerp_common::types::DataSourceConfig;
use tracing::debug;

use super::{ConnectorBackend, HealthProbe, SyncResult};
use crate::config::DatabaseConfig;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};

/// Table read when neither the source nor the run names one
pub const DEFAULT_TABLE: &str = "projects";

/// Row cap when no `limit` option is given
pub const DEFAULT_ROW_LIMIT: i64 = 500;

/// Column used for incremental reads and the returned cursor
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Bind parameter for [`QueryExecutor::query`]
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

/// Executes parameterized SQL and returns each row as a JSON object
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Map<String, Value>>>;

    /// Release pooled connections
    async fn close(&self) {}
}

/// PostgreSQL executor backed by an `sqlx` pool
#[derive(Debug, Clone)]
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool that opens connections on first use
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy(&config.url)?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Map<String, Value>>> {
        // One JSON object per row, named by column
        let wrapped = format!("SELECT row_to_json(q) FROM ({sql}) AS q");

        let mut query = sqlx::query_scalar::<sqlx::Postgres, Value>(&wrapped);
        for param in params {
            query = match param {
                SqlParam::Text(value) => query.bind(value.clone()),
                SqlParam::Int(value) => query.bind(*value),
                SqlParam::Timestamp(value) => query.bind(*value),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchOptions {
    #[serde(default = "default_table")]
    table: String,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    updated_since: Option<String>,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_limit() -> i64 {
    DEFAULT_ROW_LIMIT
}

/// Connector over the internal database
pub struct DatabaseConnector {
    executor: Arc<dyn QueryExecutor>,
}

impl DatabaseConnector {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ConnectorBackend for DatabaseConnector {
    async fn test_connection(&self, _config: &DataSourceConfig) -> Result<HealthProbe> {
        self.executor.query("SELECT 1 AS ok", &[]).await?;
        Ok(HealthProbe::healthy())
    }

    async fn fetch(&self, config: &DataSourceConfig, context: &SyncContext) -> Result<SyncResult> {
        let options: FetchOptions = serde_json::from_value(Value::Object(context.merged_options()))
            .map_err(|e| SyncError::invalid_option(&config.name, e.to_string()))?;

        if !is_valid_identifier(&options.table) {
            return Err(SyncError::invalid_option(
                &config.name,
                format!("'{}' is not a valid table name", options.table),
            ));
        }
        if options.limit < 0 {
            return Err(SyncError::invalid_option(&config.name, "limit must not be negative"));
        }

        let since_raw = options.updated_since.as_deref().or(context.cursor.as_deref());
        let since = since_raw
            .map(|raw| {
                parse_timestamp(raw).ok_or_else(|| {
                    SyncError::invalid_option(
                        &config.name,
                        format!("updatedSince '{raw}' is not an RFC 3339 timestamp or YYYY-MM-DD date"),
                    )
                })
            })
            .transpose()?;

        let (sql, params) = build_fetch_query(&options.table, since, options.limit);
        debug!(connector = %config.name, run_id = %context.run_id, %sql, "Fetching rows");

        let rows = self.executor.query(&sql, &params).await?;
        let cursor = newest_cursor(&rows);
        let row_count = rows.len();

        let mut record = Map::new();
        record.insert("table".to_string(), Value::String(options.table.clone()));
        record.insert(
            "rows".to_string(),
            Value::Array(rows.into_iter().map(Value::Object).collect()),
        );

        Ok(SyncResult::new(vec![Value::Object(record)])
            .with_cursor(cursor)
            .with_metadata("table", options.table)
            .with_metadata("rowCount", row_count))
    }

    async fn fetch_metadata(&self, _config: &DataSourceConfig) -> Result<Map<String, Value>> {
        let rows = self
            .executor
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 ORDER BY table_name",
                &[SqlParam::Text("public".to_string())],
            )
            .await?;

        let tables: Vec<Value> = rows
            .into_iter()
            .filter_map(|mut row| row.remove("table_name"))
            .collect();

        let mut metadata = Map::new();
        metadata.insert("tables".to_string(), Value::Array(tables));
        Ok(metadata)
    }

    async fn shutdown(&self) -> Result<()> {
        self.executor.close().await;
        Ok(())
    }
}

/// Build the incremental SELECT for `table`
pub(crate) fn build_fetch_query(
    table: &str,
    updated_since: Option<DateTime<Utc>>,
    limit: i64,
) -> (String, Vec<SqlParam>) {
    let mut sql = format!("SELECT * FROM {table}");
    let mut params = Vec::new();

    if let Some(since) = updated_since {
        params.push(SqlParam::Timestamp(since));
        sql.push_str(&format!(" WHERE {UPDATED_AT_COLUMN} > ${}", params.len()));
    }

    params.push(SqlParam::Int(limit));
    sql.push_str(&format!(" ORDER BY {UPDATED_AT_COLUMN} ASC LIMIT ${}", params.len()));

    (sql, params)
}

/// Plain or schema-qualified SQL identifier, e.g. `projects` or `crm.contacts`
fn is_valid_identifier(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `updated_at` of the newest row; the last row's raw value if none parse
fn newest_cursor(rows: &[Map<String, Value>]) -> Option<String> {
    let newest = rows
        .iter()
        .filter_map(|row| row.get(UPDATED_AT_COLUMN))
        .filter_map(|value| Some((parse_timestamp(value.as_str()?)?, value)))
        .max_by_key(|(ts, _)| *ts)
        .map(|(_, value)| value);

    newest
        .or_else(|| rows.last().and_then(|row| row.get(UPDATED_AT_COLUMN)))
        .and_then(cursor_value)
}

fn cursor_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
