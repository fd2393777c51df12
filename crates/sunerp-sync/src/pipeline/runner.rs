//! Pipeline runner
//!
//! Resolves a pipeline and its data source, then feeds one payload through
//! the stages strictly in order. Resolution failures are returned as errors;
//! a failing stage is captured into a `failed` result instead. Stages that
//! already ran are not undone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn, Instrument};

use super::{
    error_count, record_count, PipelineCatalog, PipelineDefinition, PipelineExecutionResult,
    PipelineStage, PipelineStatus, PipelineSummary, StageMetadata, StageResult,
};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::registry::ConnectorRegistry;

pub struct PipelineRunner {
    pipelines: Arc<PipelineCatalog>,
    registry: Arc<ConnectorRegistry>,
    stage_timeout: Option<Duration>,
}

impl PipelineRunner {
    pub fn new(pipelines: Arc<PipelineCatalog>, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            pipelines,
            registry,
            stage_timeout: None,
        }
    }

    /// Fail any stage that runs longer than `timeout`
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn pipelines(&self) -> &Arc<PipelineCatalog> {
        &self.pipelines
    }

    /// Run the pipeline called `name` with caller options
    pub async fn run(&self, name: &str, options: Map<String, Value>) -> Result<PipelineExecutionResult> {
        let pipeline = self
            .pipelines
            .get(name)
            .ok_or_else(|| SyncError::UnknownPipeline(name.to_string()))?;

        if !pipeline.enabled {
            return Err(SyncError::PipelineDisabled(name.to_string()));
        }

        let source = self
            .registry
            .sources()
            .get(&pipeline.source)
            .cloned()
            .ok_or_else(|| SyncError::UnknownDataSource(pipeline.source.clone()))?;

        // Surfaces unknown connector types before any stage runs
        self.registry.get_or_create_connector(&source.name).await?;

        let context = Arc::new(self.registry.create_sync_context(&source, options));
        let span = tracing::info_span!("pipeline_run", pipeline = %pipeline.name, run_id = %context.run_id);

        Ok(self.execute(pipeline, context).instrument(span).await)
    }

    async fn execute(&self, pipeline: &PipelineDefinition, context: Arc<SyncContext>) -> PipelineExecutionResult {
        let started_at = Utc::now();
        info!(source = %context.source.name, stages = pipeline.stages.len(), "Pipeline started");

        let mut payload = json!({ "records": [] });
        let mut stage_results = Vec::with_capacity(pipeline.stages.len());

        for stage in &pipeline.stages {
            let started = Instant::now();

            match self.run_stage(stage, Arc::clone(&context), payload).await {
                Ok(output) => {
                    payload = output;
                    let result = StageResult {
                        name: stage.name.clone(),
                        duration_ms: elapsed_ms(started),
                        metadata: StageMetadata {
                            records: record_count(&payload),
                        },
                    };
                    debug!(stage = %result.name, duration_ms = result.duration_ms, records = ?result.metadata.records, "Stage completed");
                    stage_results.push(result);
                },
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(stage = %stage.name, error = %message, "Pipeline stage failed");

                    return PipelineExecutionResult {
                        pipeline: pipeline.name.clone(),
                        run_id: context.run_id,
                        started_at,
                        finished_at: Utc::now(),
                        status: PipelineStatus::Failed,
                        summary: PipelineSummary {
                            error: Some(message),
                            ..PipelineSummary::default()
                        },
                        stage_results,
                    };
                },
            }
        }

        let records_processed = record_count(&payload).unwrap_or(0);
        let record_errors = error_count(&payload);
        let status = if record_errors > 0 {
            warn!(records_processed, record_errors, "Pipeline finished with record errors");
            PipelineStatus::Warning
        } else {
            info!(records_processed, "Pipeline finished");
            PipelineStatus::Success
        };

        PipelineExecutionResult {
            pipeline: pipeline.name.clone(),
            run_id: context.run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            summary: PipelineSummary {
                records_processed: Some(records_processed),
                record_errors: (record_errors > 0).then_some(record_errors),
                error: None,
            },
            stage_results,
        }
    }

    async fn run_stage(
        &self,
        stage: &PipelineStage,
        context: Arc<SyncContext>,
        input: Value,
    ) -> anyhow::Result<Value> {
        match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, stage.run(context, input))
                .await
                .map_err(|_| {
                    anyhow::anyhow!("stage '{}' timed out after {}ms", stage.name, limit.as_millis())
                })?,
            None => stage.run(context, input).await,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
