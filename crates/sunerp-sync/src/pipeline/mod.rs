//! Pipelines
//!
//! A pipeline is a named, ordered list of stages bound to one data source.
//! Each stage receives the run's [`SyncContext`] and the previous stage's
//! JSON payload and returns the next payload. The first stage sees
//! `{"records": []}`.

pub mod catalog;
pub mod runner;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::SyncContext;

pub use catalog::PipelineCatalog;
pub use runner::PipelineRunner;

/// Descriptive stage category; the runner treats all kinds alike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Extract,
    Transform,
    Load,
}

type StageFn = Arc<dyn Fn(Arc<SyncContext>, Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// One step of a pipeline
#[derive(Clone)]
pub struct PipelineStage {
    pub name: String,
    pub kind: StageKind,
    run: StageFn,
}

impl PipelineStage {
    pub fn new<F, Fut>(name: impl Into<String>, kind: StageKind, run: F) -> Self
    where
        F: Fn(Arc<SyncContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind,
            run: Arc::new(move |context, input| Box::pin(run(context, input))),
        }
    }

    pub fn extract<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Arc<SyncContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, StageKind::Extract, run)
    }

    pub fn transform<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Arc<SyncContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, StageKind::Transform, run)
    }

    pub fn load<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Arc<SyncContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, StageKind::Load, run)
    }

    pub async fn run(&self, context: Arc<SyncContext>, input: Value) -> anyhow::Result<Value> {
        (self.run)(context, input).await
    }
}

impl fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Static, named composition of stages
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub display_name: String,
    /// Data source name the pipeline reads from
    pub source: String,
    pub enabled: bool,
    pub stages: Vec<PipelineStage>,
}

impl PipelineDefinition {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            source: source.into(),
            enabled: true,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: PipelineStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Success,
    /// Every stage finished but the final payload reports record errors
    Warning,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_errors: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetadata {
    /// Length of the stage output's `records` array, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub name: String,
    pub duration_ms: u64,
    pub metadata: StageMetadata,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecutionResult {
    pub pipeline: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: PipelineStatus,
    pub summary: PipelineSummary,
    pub stage_results: Vec<StageResult>,
}

/// Length of `payload.records` when it is an array
pub fn record_count(payload: &Value) -> Option<usize> {
    payload.get("records")?.as_array().map(Vec::len)
}

/// Length of `payload.errors` when it is an array, otherwise zero
pub fn error_count(payload: &Value) -> usize {
    payload
        .get("errors")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_count() {
        assert_eq!(record_count(&json!({ "records": [1, 2, 3] })), Some(3));
        assert_eq!(record_count(&json!({ "records": "three" })), None);
        assert_eq!(record_count(&json!({ "features": {} })), None);
        assert_eq!(record_count(&json!([1, 2])), None);
    }

    #[test]
    fn test_error_count() {
        assert_eq!(error_count(&json!({ "errors": [{ "message": "x" }] })), 1);
        assert_eq!(error_count(&json!({ "records": [] })), 0);
    }

    #[test]
    fn test_summary_omits_absent_fields() {
        let summary = PipelineSummary {
            records_processed: Some(3),
            ..PipelineSummary::default()
        };
        assert_eq!(serde_json::to_value(&summary).unwrap(), json!({ "recordsProcessed": 3 }));
    }

    #[tokio::test]
    async fn test_stage_runs_closure() {
        use sunerp_common::types::{DataSourceConfig, DataSourceType};

        let stage = PipelineStage::transform("double", |_ctx, input: Value| async move {
            let n = input["n"].as_i64().unwrap_or(0);
            Ok(json!({ "n": n * 2 }))
        });
        let ctx = Arc::new(SyncContext::new(
            DataSourceConfig::new("erp", DataSourceType::InternalDb),
            serde_json::Map::new(),
        ));

        let output = stage.run(ctx, json!({ "n": 21 })).await.unwrap();
        assert_eq!(output, json!({ "n": 42 }));
        assert_eq!(stage.kind, StageKind::Transform);
    }
}
