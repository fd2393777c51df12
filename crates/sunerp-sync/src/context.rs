//! Per-run sync context

use serde::Serialize;
use serde_json::{Map, Value};
use sunerp_common::types::DataSourceConfig;
use uuid::Uuid;

/// Option key carrying a resumption token supplied by the caller
pub const CURSOR_OPTION: &str = "cursor";

/// Everything one connector call or pipeline run needs to know about itself
///
/// Created fresh for every invocation and never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncContext {
    /// Correlates log lines and results of one invocation
    pub run_id: Uuid,
    pub source: DataSourceConfig,
    pub cursor: Option<String>,
    /// Caller overrides such as `table`, `limit` or `updatedSince`
    pub options: Map<String, Value>,
}

impl SyncContext {
    pub fn new(source: DataSourceConfig, options: Map<String, Value>) -> Self {
        let cursor = options
            .get(CURSOR_OPTION)
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            run_id: Uuid::new_v4(),
            source,
            cursor,
            options,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Source options overlaid with the run options
    pub fn merged_options(&self) -> Map<String, Value> {
        let mut merged = self.source.options.clone();
        merged.extend(self.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
