//! Pipeline catalog
//!
//! Named pipeline definitions plus the default set shipped with the ERP.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::debug;

use super::{PipelineDefinition, PipelineStage};
use crate::error::{Result, SyncError};
use crate::intake::{aggregate_features, normalize_leads, PvIntake};
use crate::registry::ConnectorRegistry;

#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    pipelines: Vec<PipelineDefinition>,
}

impl PipelineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition; names must be unique
    pub fn register(&mut self, pipeline: PipelineDefinition) -> Result<()> {
        if self.get(&pipeline.name).is_some() {
            return Err(SyncError::Config(format!(
                "pipeline '{}' is already registered",
                pipeline.name
            )));
        }
        debug!(pipeline = %pipeline.name, stages = pipeline.stages.len(), "Registered pipeline");
        self.pipelines.push(pipeline);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    /// All definitions in registration order
    pub fn list_pipelines(&self) -> &[PipelineDefinition] {
        &self.pipelines
    }

    pub fn enabled_pipelines(&self) -> Vec<&PipelineDefinition> {
        self.pipelines.iter().filter(|p| p.enabled).collect()
    }

    /// Pipelines every deployment ships with
    pub fn default_catalog(registry: Arc<ConnectorRegistry>) -> Result<Self> {
        let mut catalog = Self::new();

        catalog.register(
            PipelineDefinition::new("pv-leads-import", "PV lead import", "pv-leads-csv")
                .stage(fetch_stage("extract-leads", Arc::clone(&registry)))
                .stage(PipelineStage::transform("normalize-leads", |_ctx, input| async move {
                    normalize_stage(input)
                }))
                .stage(PipelineStage::transform("aggregate-features", |_ctx, input| async move {
                    features_stage(input)
                })),
        )?;

        catalog.register(
            PipelineDefinition::new("projects-sync", "ERP project sync", "erp-database")
                .stage(fetch_stage("extract-projects", Arc::clone(&registry)))
                .stage(PipelineStage::transform("flatten-rows", |_ctx, input| async move {
                    Ok(flatten_rows(input))
                })),
        )?;

        catalog.register(
            PipelineDefinition::new("external-crm-sync", "External CRM contact sync", "external-crm")
                .stage(fetch_stage("extract-contacts", registry))
                .disabled(),
        )?;

        Ok(catalog)
    }
}

/// Stage that fetches from the pipeline's data source through the registry
pub fn fetch_stage(name: impl Into<String>, registry: Arc<ConnectorRegistry>) -> PipelineStage {
    PipelineStage::extract(name, move |ctx, _input| {
        let registry = Arc::clone(&registry);
        async move {
            let connector = registry.get_or_create_connector(&ctx.source.name).await?;
            let result = connector
                .fetch(&ctx)
                .await
                .with_context(|| format!("fetch from '{}' failed", ctx.source.name))?;
            Ok(result.into_payload())
        }
    })
}

fn records_of(payload: &Value) -> &[Value] {
    payload
        .get("records")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn errors_of(payload: &Value) -> Vec<Value> {
    payload
        .get("errors")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Copy `cursor` and `metadata` from `input` into `output`
fn carry_over(input: &Value, output: &mut Map<String, Value>) {
    for key in ["cursor", "metadata"] {
        if let Some(value) = input.get(key) {
            output.insert(key.to_string(), value.clone());
        }
    }
}

fn normalize_stage(input: Value) -> anyhow::Result<Value> {
    let (intakes, rejected) = normalize_leads(records_of(&input));

    let mut errors = errors_of(&input);
    for error in rejected {
        errors.push(serde_json::to_value(error)?);
    }

    let mut output = Map::new();
    output.insert("records".to_string(), serde_json::to_value(intakes)?);
    if !errors.is_empty() {
        output.insert("errors".to_string(), Value::Array(errors));
    }
    carry_over(&input, &mut output);
    Ok(Value::Object(output))
}

fn features_stage(input: Value) -> anyhow::Result<Value> {
    let intakes: Vec<PvIntake> = serde_json::from_value(Value::Array(records_of(&input).to_vec()))
        .context("aggregate-features expects normalized intake records")?;
    let features = aggregate_features(&intakes);

    let mut output = match input {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    output.entry("records").or_insert_with(|| Value::Array(Vec::new()));
    output.insert("features".to_string(), serde_json::to_value(features)?);
    Ok(Value::Object(output))
}

/// Unwrap `{table, rows}` records into the rows themselves
fn flatten_rows(input: Value) -> Value {
    let rows: Vec<Value> = records_of(&input)
        .iter()
        .flat_map(|record| match record.get("rows").and_then(Value::as_array) {
            Some(rows) => rows.clone(),
            None => vec![record.clone()],
        })
        .collect();

    let mut output = Map::new();
    output.insert("records".to_string(), Value::Array(rows));
    if let Some(errors) = input.get("errors") {
        output.insert("errors".to_string(), errors.clone());
    }
    carry_over(&input, &mut output);
    Value::Object(output)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sources::DataSourceCatalog;
    use serde_json::json;

    fn registry() -> Arc<ConnectorRegistry> {
        Arc::new(ConnectorRegistry::new(Arc::new(DataSourceCatalog::with_defaults())))
    }

    #[test]
    fn test_default_catalog() {
        let catalog = PipelineCatalog::default_catalog(registry()).unwrap();

        let names: Vec<&str> = catalog.list_pipelines().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pv-leads-import", "projects-sync", "external-crm-sync"]);

        let enabled: Vec<&str> = catalog.enabled_pipelines().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(enabled, vec!["pv-leads-import", "projects-sync"]);

        let leads = catalog.get("pv-leads-import").unwrap();
        assert_eq!(leads.source, "pv-leads-csv");
        let stages: Vec<&str> = leads.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(stages, vec!["extract-leads", "normalize-leads", "aggregate-features"]);
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut catalog = PipelineCatalog::new();
        catalog.register(PipelineDefinition::new("a", "A", "erp-database")).unwrap();
        let err = catalog
            .register(PipelineDefinition::new("a", "A again", "pv-leads-csv"))
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert_eq!(catalog.list_pipelines().len(), 1);
    }

    #[test]
    fn test_flatten_rows_unwraps_tables() {
        let output = flatten_rows(json!({
            "records": [{ "table": "projects", "rows": [{ "id": 1 }, { "id": 2 }] }],
            "cursor": "2026-10-01T00:00:00+00:00",
            "metadata": { "table": "projects" }
        }));

        assert_eq!(output["records"], json!([{ "id": 1 }, { "id": 2 }]));
        assert_eq!(output["cursor"], json!("2026-10-01T00:00:00+00:00"));
        assert_eq!(output["metadata"]["table"], json!("projects"));
    }

    #[test]
    fn test_normalize_then_aggregate() {
        let input = json!({
            "records": [
                { "id": "1", "name": "Berger", "roof_type": "flat", "desired_capacity_kwp": "12", "storage": "no" },
                { "id": "2", "name": "Kunz", "roof_type": "pitched", "desired_capacity_kwp": "8", "storage": "yes" },
                { "name": "Anonymous" }
            ],
            "errors": [{ "message": "row 4: expected 5 fields, found 2" }]
        });

        let normalized = normalize_stage(input).unwrap();
        assert_eq!(normalized["records"].as_array().unwrap().len(), 2);
        assert_eq!(normalized["errors"].as_array().unwrap().len(), 2);
        assert_eq!(normalized["records"][0]["roofType"], json!("flat"));

        let aggregated = features_stage(normalized).unwrap();
        assert_eq!(aggregated["features"]["leadCount"], json!(2));
        assert_eq!(aggregated["features"]["totalCapacityKwp"], json!(20.0));
        assert_eq!(aggregated["features"]["storageRequested"], json!(1));
        assert_eq!(aggregated["records"].as_array().unwrap().len(), 2);
    }
}
