// src/dispatch/worker_pool.rs
//! Fixed pool of blocking workers, one per shard
//!
//! Each worker builds its own dispatcher, walks its shard in order and closes
//! every task's files once the guest has finished with them. Workers never
//! share ids and never rebalance.
//!
//! Outcome handling per id:
//! - `Ok` → completed
//! - non-fatal error → logged, id recorded as failed, shard continues
//! - fatal error → shard aborted, remaining ids recorded as skipped

use crate::dispatch::shard::ShardPlan;
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::TaskId;
use crate::vfs::registry::FilesystemRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Upper bound on workers; each worker and its drainer hold a blocking thread
pub const MAX_WORKERS: usize = 256;

/// How task ids reach the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// One entry export call per id through guest memory
    Filesystem,

    /// All of a shard's ids as stdin to `_start`
    Stdin,
}

/// Dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of workers (and shards)
    pub workers: usize,

    pub transport: Transport,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 25,
            transport: Transport::Filesystem,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(BridgeError::ConfigError("Worker count must be at least 1".to_string()));
        }
        if self.workers > MAX_WORKERS {
            return Err(BridgeError::ConfigError(format!(
                "Worker count {} exceeds maximum of {}",
                self.workers, MAX_WORKERS
            )));
        }
        Ok(())
    }
}

/// Anything that can run the guest on one task id
pub trait TaskDispatcher {
    fn dispatch(&mut self, task_id: &TaskId) -> Result<()>;
}

/// Per-worker outcome
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub worker: usize,

    /// Ids in this worker's shard
    pub assigned: usize,

    pub completed: usize,

    /// Ids whose dispatch failed without aborting the shard
    pub failed: Vec<TaskId>,

    /// Ids never dispatched because the shard aborted
    pub skipped: usize,

    /// Reason the shard stopped early, if it did
    pub aborted: Option<String>,

    pub elapsed_ms: u64,
}

impl WorkerReport {
    pub(crate) fn new(worker: usize, assigned: usize) -> Self {
        Self {
            worker,
            assigned,
            completed: 0,
            failed: Vec::new(),
            skipped: 0,
            aborted: None,
            elapsed_ms: 0,
        }
    }
}

/// Aggregate outcome of one pool run
#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
}

impl PoolReport {
    pub fn assigned(&self) -> usize {
        self.workers.iter().map(|w| w.assigned).sum()
    }

    pub fn completed(&self) -> usize {
        self.workers.iter().map(|w| w.completed).sum()
    }

    pub fn failed(&self) -> usize {
        self.workers.iter().map(|w| w.failed.len()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.workers.iter().map(|w| w.skipped).sum()
    }

    /// Workers whose shard stopped early
    pub fn aborted_workers(&self) -> Vec<usize> {
        self.workers
            .iter()
            .filter(|w| w.aborted.is_some())
            .map(|w| w.worker)
            .collect()
    }

    /// Every id recorded as failed, in worker order
    pub fn failed_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.workers.iter().flat_map(|w| w.failed.iter())
    }
}

/// Dispatches a [`ShardPlan`] against a populated registry
pub struct WorkerPool {
    registry: Arc<FilesystemRegistry>,
    plan: Arc<ShardPlan>,
}

impl WorkerPool {
    /// Every planned id must already be registered
    pub fn new(registry: Arc<FilesystemRegistry>, plan: ShardPlan) -> Result<Self> {
        if let Some(missing) = plan.iter().find(|id| !registry.contains(id)) {
            return Err(BridgeError::UnregisteredTask(missing.to_string()));
        }

        Ok(Self {
            registry,
            plan: Arc::new(plan),
        })
    }

    pub fn plan(&self) -> &ShardPlan {
        &self.plan
    }

    /// Run every shard to completion and collect the reports
    ///
    /// `factory` is called once per worker, on that worker's thread, to build
    /// its dispatcher. A factory error aborts only that worker's shard.
    pub async fn run<F, D>(&self, factory: F) -> Result<PoolReport>
    where
        F: Fn(usize) -> Result<D> + Send + Sync + 'static,
        D: TaskDispatcher,
    {
        let workers = self.plan.workers();
        info!("Dispatching {} tasks across {} workers", self.plan.total(), workers);

        let factory = Arc::new(factory);
        let handles = (0..workers).map(|worker| {
            let plan = Arc::clone(&self.plan);
            let registry = Arc::clone(&self.registry);
            let factory = Arc::clone(&factory);
            tokio::task::spawn_blocking(move || {
                run_shard(worker, plan.shard(worker), &registry, factory.as_ref())
            })
        });

        let results = futures::future::join_all(handles).await;

        let mut reports = Vec::with_capacity(workers);
        for (worker, result) in results.into_iter().enumerate() {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Worker {} panicked: {}", worker, e);
                    // Unblock this shard's drainer before bailing out
                    for task_id in self.plan.shard(worker) {
                        self.registry.close_task(task_id);
                    }
                    return Err(BridgeError::WorkerPanicked(worker));
                }
            }
        }

        let report = PoolReport { workers: reports };
        info!(
            "Dispatch finished: {} completed, {} failed, {} skipped",
            report.completed(),
            report.failed(),
            report.skipped()
        );
        Ok(report)
    }
}

fn run_shard<F, D>(worker: usize, shard: &[TaskId], registry: &FilesystemRegistry, factory: &F) -> WorkerReport
where
    F: Fn(usize) -> Result<D>,
    D: TaskDispatcher,
{
    let started = Instant::now();
    let mut report = WorkerReport::new(worker, shard.len());

    let mut dispatcher = match factory(worker) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!("Worker {} failed to start: {}", worker, e);
            abort_remaining(&mut report, shard, registry, e.to_string());
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            return report;
        }
    };

    for (position, task_id) in shard.iter().enumerate() {
        let dispatch_started = Instant::now();
        let outcome = dispatcher.dispatch(task_id);
        registry.close_task(task_id);
        metrics::histogram!("bridge_dispatch_seconds").record(dispatch_started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                debug!("Worker {} completed task {}", worker, task_id);
                metrics::counter!("bridge_dispatch_total", "outcome" => "completed").increment(1);
                report.completed += 1;
            }
            Err(e) if e.is_fatal() => {
                error!("Worker {} aborting shard at task {}: {}", worker, task_id, e);
                metrics::counter!("bridge_dispatch_total", "outcome" => "aborted").increment(1);
                report.failed.push(task_id.clone());
                abort_remaining(&mut report, &shard[position + 1..], registry, e.to_string());
                break;
            }
            Err(e) => {
                warn!("Worker {} skipping task {}: {}", worker, task_id, e);
                metrics::counter!("bridge_dispatch_total", "outcome" => "failed").increment(1);
                report.failed.push(task_id.clone());
            }
        }
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    debug!(
        "Worker {} done in {}ms ({}/{} completed)",
        worker, report.elapsed_ms, report.completed, report.assigned
    );
    report
}

fn abort_remaining(report: &mut WorkerReport, rest: &[TaskId], registry: &FilesystemRegistry, reason: String) {
    for task_id in rest {
        registry.close_task(task_id);
    }
    if !rest.is_empty() {
        metrics::counter!("bridge_dispatch_total", "outcome" => "skipped").increment(rest.len() as u64);
    }
    report.skipped += rest.len();
    report.aborted = Some(reason);
}
