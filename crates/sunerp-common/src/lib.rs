//! Sunerp Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the Sunerp workspace.
//!
//! # Overview
//!
//! - **Types**: data source descriptors shared by every integration component
//! - **Error Handling**: the common error type and result alias
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//!
//! # Example
//!
//! ```no_run
//! use sunerp_common::logging::{init_logging, LogConfig};
//! use sunerp_common::types::{Capability, DataSourceConfig, DataSourceType};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!
//!     let source = DataSourceConfig::new("pv-leads-csv", DataSourceType::CsvFile)
//!         .with_capabilities([Capability::Read])
//!         .with_option("path", "data/pv-leads.csv");
//!     tracing::info!(source = %source.name, "Data source configured");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
