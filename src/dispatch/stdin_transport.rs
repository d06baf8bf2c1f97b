// src/dispatch/stdin_transport.rs
//! Alternate transport: task ids over guest stdin
//!
//! Instead of calling the entry export once per id, each worker hands its
//! whole shard to a fresh exclusive instance as newline-delimited stdin and
//! runs the guest's `_start`. The guest loops over the lines itself. Task
//! data still flows through the virtual filesystem.
//!
//! The host cannot observe individual ids here, so the outcome is per shard:
//! all completed, or aborted with every id counted as skipped.

use crate::dispatch::shard::ShardPlan;
use crate::dispatch::worker_pool::{PoolReport, WorkerReport};
use crate::runtime::instance_pool::InstancePool;
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::TaskId;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Newline-delimited ids, one per line
pub fn encode_ids(ids: &[TaskId]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ids.iter().map(|id| id.as_bytes().len() + 1).sum());
    for id in ids {
        bytes.extend_from_slice(id.as_bytes());
        bytes.push(b'\n');
    }
    bytes
}

/// Run every shard through its guest's `_start`
pub async fn run_stdin_transport(plan: Arc<ShardPlan>, pool: Arc<InstancePool>) -> Result<PoolReport> {
    if let Some(missing) = plan.iter().find(|id| !pool.registry().contains(id)) {
        return Err(BridgeError::UnregisteredTask(missing.to_string()));
    }

    let workers = plan.workers();
    info!("Streaming {} task ids over stdin to {} workers", plan.total(), workers);

    let handles = (0..workers).map(|worker| {
        let plan = Arc::clone(&plan);
        let pool = Arc::clone(&pool);
        tokio::task::spawn_blocking(move || run_shard(worker, plan.shard(worker), &pool))
    });

    let results = futures::future::join_all(handles).await;

    let mut reports = Vec::with_capacity(workers);
    for (worker, result) in results.into_iter().enumerate() {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("Stdin worker {} panicked: {}", worker, e);
                for task_id in plan.shard(worker) {
                    pool.registry().close_task(task_id);
                }
                return Err(BridgeError::WorkerPanicked(worker));
            }
        }
    }

    Ok(PoolReport { workers: reports })
}

fn run_shard(worker: usize, shard: &[TaskId], pool: &InstancePool) -> WorkerReport {
    let started = Instant::now();
    let mut report = WorkerReport::new(worker, shard.len());

    let outcome = pool
        .acquire_with_stdin(worker, encode_ids(shard))
        .and_then(|mut instance| instance.run_command());

    for task_id in shard {
        pool.registry().close_task(task_id);
    }

    match outcome {
        Ok(()) => {
            metrics::counter!("bridge_dispatch_total", "outcome" => "completed").increment(shard.len() as u64);
            report.completed = shard.len();
        }
        Err(e) => {
            error!("Stdin worker {} aborted: {}", worker, e);
            metrics::counter!("bridge_dispatch_total", "outcome" => "skipped").increment(shard.len() as u64);
            report.skipped = shard.len();
            report.aborted = Some(e.to_string());
        }
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report
}
