//! Command-line interface

use std::fmt::Write as _;

use clap::{ArgAction, Parser};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::pipeline::PipelineCatalog;
use crate::runtime::SyncRuntime;

#[derive(Parser, Debug)]
#[command(name = "sunerp-sync")]
#[command(author, version, about = "Run Sunerp data integration pipelines")]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Pipeline to run; lists the enabled pipelines when omitted
    pub pipeline: Option<String>,

    /// Run options passed to the pipeline
    #[arg(value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// List the enabled pipelines
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub help: bool,
}

impl Cli {
    pub fn wants_listing(&self) -> bool {
        self.help || self.pipeline.is_none()
    }
}

/// Parse `KEY=VALUE` arguments into run options
pub fn parse_options(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut options = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| SyncError::Config(format!("expected KEY=VALUE, got '{pair}'")))?;
        options.insert(key.to_string(), parse_value(value));
    }
    Ok(options)
}

/// Integer, then boolean, otherwise the raw string
pub fn parse_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

pub fn pipeline_listing(catalog: &PipelineCatalog) -> String {
    let mut out = String::from("Available pipelines:\n");
    for pipeline in catalog.enabled_pipelines() {
        let _ = writeln!(out, "  {:<20} {}", pipeline.name, pipeline.display_name);
    }
    out.push_str("\nUsage: sunerp-sync <PIPELINE> [KEY=VALUE]...\n");
    out
}

/// Execute the invocation and return what goes to stdout
pub async fn run(cli: &Cli, runtime: &SyncRuntime) -> Result<String> {
    let name = match cli.pipeline.as_deref() {
        Some(name) if !cli.wants_listing() => name,
        _ => return Ok(pipeline_listing(runtime.pipelines())),
    };

    let options = parse_options(&cli.options)?;
    let result = runtime.run_pipeline(name, options).await?;
    Ok(serde_json::to_string_pretty(&result)?)
}
