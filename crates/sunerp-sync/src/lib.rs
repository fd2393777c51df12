//! Sunerp Sync Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Data integration layer of the Sunerp PV ERP.
//!
//! # Overview
//!
//! - **Data Sources**: built-in descriptors merged with a JSON file (`sources`)
//! - **Connectors**: capability-gated adapters for the internal database and
//!   CSV exports (`connector`)
//! - **Registry**: one lazily created connector per data source (`registry`)
//! - **Pipelines**: named stage sequences and the runner that executes them
//!   (`pipeline`)
//! - **PV Intake**: lead normalization and feature aggregation (`intake`)
//! - **CLI**: `sunerp-sync <PIPELINE> [KEY=VALUE]...` (`cli`)

pub mod cli;
pub mod config;
pub mod connector;
pub mod context;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod sources;

// Re-export commonly used types
pub use connector::{Connector, ConnectorBackend, SyncResult};
pub use context::SyncContext;
pub use error::{Result, SyncError};
pub use pipeline::{
    PipelineCatalog, PipelineDefinition, PipelineExecutionResult, PipelineRunner, PipelineStage,
    PipelineStatus,
};
pub use registry::ConnectorRegistry;
pub use runtime::SyncRuntime;
pub use sources::DataSourceCatalog;
