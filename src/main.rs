// src/main.rs
//! Sandbox Bridge
//!
//! Seeds a batch of random payloads, pushes every task through the guest
//! and verifies each output byte for byte.

use anyhow::{bail, Context, Result};
use sandbox_bridge::harness::run_batch;
use sandbox_bridge::observability::{init_metrics, init_tracing};
use sandbox_bridge::runtime::GuestModule;
use sandbox_bridge::utils::config::BridgeConfig;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = BridgeConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    let metrics = if config.observability.metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    info!("Starting Sandbox Bridge v{}", sandbox_bridge::VERSION);
    info!("Configuration loaded: {:?}", config);

    let module = Arc::new(GuestModule::load(config.runtime.clone()).context("Failed to load guest module")?);

    let report = run_batch(&config.harness, &config.dispatch, module).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(handle) = metrics {
        info!("Metrics snapshot:\n{}", handle.render());
    }

    if !report.is_clean() {
        error!(
            "Batch finished with {} mismatches, {} read errors, {} failed and {} skipped tasks",
            report.mismatches.len(),
            report.read_errors.len(),
            report.pool.failed(),
            report.pool.skipped()
        );
        bail!("Data mismatch in {} of {} tasks", report.tasks - report.verified, report.tasks);
    }

    info!("Processed {} tasks in {}ms", report.tasks, report.elapsed_ms);
    Ok(())
}
