// src/harness/mod.rs
//! End-to-end verification harness
//!
//! Seeds a batch of random payloads, dispatches it through a guest and checks
//! every output against its input.
//!
//! ```text
//! seed ──→ registry ──→ workers ──→ guest ──→ out pipes ──→ drainers ──→ report
//! ```

pub mod guests;
pub mod seed;
pub mod verify;

pub use seed::{seed, Expected, HarnessConfig, SeededBatch};
pub use verify::VerificationReport;

use crate::dispatch::stdin_transport::run_stdin_transport;
use crate::dispatch::worker_pool::{DispatchConfig, PoolReport, Transport, WorkerPool};
use crate::runtime::guest_module::GuestModule;
use crate::runtime::instance_pool::{InstancePool, InstancePoolStats};
use crate::utils::errors::Result;
use crate::vfs::path::TaskId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Summary of one harness run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub tasks: usize,
    pub workers: usize,
    pub transport: Transport,

    /// Outputs identical to their input
    pub verified: usize,
    pub mismatches: Vec<TaskId>,
    pub read_errors: Vec<(TaskId, String)>,

    pub pool: PoolReport,
    pub instances: InstancePoolStats,
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Every task dispatched and verified
    pub fn is_clean(&self) -> bool {
        self.verified == self.tasks
            && self.mismatches.is_empty()
            && self.read_errors.is_empty()
            && self.pool.failed() == 0
            && self.pool.skipped() == 0
    }
}

/// Seed a fresh batch and run it
pub async fn run_batch(
    harness: &HarnessConfig,
    dispatch: &DispatchConfig,
    module: Arc<GuestModule>,
) -> Result<BatchReport> {
    dispatch.validate()?;
    let batch = seed(harness, dispatch.workers)?;
    run_seeded(batch, dispatch.transport, module).await
}

/// Dispatch an already seeded batch and verify its outputs
pub async fn run_seeded(batch: SeededBatch, transport: Transport, module: Arc<GuestModule>) -> Result<BatchReport> {
    let started_at = Utc::now();
    let tasks = batch.len();
    let workers = batch.plan.workers();

    let pool = Arc::new(InstancePool::new(module, Arc::clone(&batch.registry)));
    let drainers = verify::spawn_drainers(batch.expectations);

    info!("Prepared {} tasks, dispatching over {:?}", tasks, transport);
    let start = Instant::now();

    let pool_report = match transport {
        Transport::Filesystem => {
            let worker_pool = WorkerPool::new(Arc::clone(&batch.registry), batch.plan)?;
            let instances = Arc::clone(&pool);
            worker_pool.run(move |worker| instances.acquire(worker)).await?
        }
        Transport::Stdin => run_stdin_transport(Arc::new(batch.plan), Arc::clone(&pool)).await?,
    };

    let verification = verify::collect(drainers).await?;
    let elapsed = start.elapsed();
    metrics::histogram!("bridge_batch_seconds").record(elapsed.as_secs_f64());

    info!(
        "Processed {} tasks in {:?}: {} verified, {} mismatched",
        tasks,
        elapsed,
        verification.verified,
        verification.mismatches.len()
    );

    Ok(BatchReport {
        started_at,
        tasks,
        workers,
        transport,
        verified: verification.verified,
        mismatches: verification.mismatches,
        read_errors: verification.read_errors,
        pool: pool_report,
        instances: pool.stats(),
        elapsed_ms: elapsed.as_millis() as u64,
    })
}
