//! Sunerp Sync - pipeline runner entry point

use std::process;

use anyhow::Result;
use clap::Parser;
use sunerp_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use sunerp_sync::cli::{self, Cli};
use sunerp_sync::config::SyncConfig;
use sunerp_sync::runtime::SyncRuntime;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Quiet by default so stdout stays machine readable; logs go to stderr
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("sunerp-sync")
        .build();

    // Environment takes precedence; a bad variable keeps the CLI defaults
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let guard = init_logging(&log_config).ok().flatten();

    let code = match execute(&cli).await {
        Ok(output) => {
            println!("{output}");
            0
        },
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            1
        },
    };

    drop(guard);
    process::exit(code);
}

async fn execute(cli: &Cli) -> Result<String> {
    let config = SyncConfig::load()?;
    let runtime = SyncRuntime::from_config(&config)?;

    let output = cli::run(cli, &runtime).await;
    runtime.shutdown().await;

    Ok(output?)
}
