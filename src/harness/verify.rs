// src/harness/verify.rs
//! Output verification
//!
//! One drainer per shard reads that shard's outputs in the order its worker
//! produces them. With bounded pipes this is what keeps a worker from
//! blocking on an output nobody is reading yet.

use crate::harness::seed::Expected;
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::TaskId;
use serde::Serialize;
use std::io::Read;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of draining and comparing outputs
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    /// Outputs identical to their input
    pub verified: usize,

    /// Outputs that differ from their input
    pub mismatches: Vec<TaskId>,

    /// Outputs that could not be read
    pub read_errors: Vec<(TaskId, String)>,
}

impl VerificationReport {
    pub fn merge(&mut self, other: VerificationReport) {
        self.verified += other.verified;
        self.mismatches.extend(other.mismatches);
        self.read_errors.extend(other.read_errors);
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.read_errors.is_empty()
    }
}

/// Read every output in `shard` to end-of-stream and compare
pub fn drain_shard(shard: Vec<Expected>) -> VerificationReport {
    let mut report = VerificationReport::default();

    for mut expected in shard {
        let mut data = Vec::with_capacity(expected.payload.len());
        match expected.output.read_to_end(&mut data) {
            Ok(_) if data == expected.payload => {
                metrics::counter!("bridge_verify_total", "outcome" => "verified").increment(1);
                report.verified += 1;
            }
            Ok(_) => {
                warn!(
                    "Data mismatch for task {}: expected {} bytes, got {}",
                    expected.task_id,
                    expected.payload.len(),
                    data.len()
                );
                metrics::counter!("bridge_verify_total", "outcome" => "mismatch").increment(1);
                report.mismatches.push(expected.task_id);
            }
            Err(e) => {
                warn!("Failed to read output of task {}: {}", expected.task_id, e);
                metrics::counter!("bridge_verify_total", "outcome" => "read_error").increment(1);
                report.read_errors.push((expected.task_id, e.to_string()));
            }
        }
    }

    report
}

/// Start one blocking drainer per shard
pub fn spawn_drainers(expectations: Vec<Vec<Expected>>) -> Vec<JoinHandle<VerificationReport>> {
    debug!("Starting {} drainers", expectations.len());
    expectations
        .into_iter()
        .map(|shard| tokio::task::spawn_blocking(move || drain_shard(shard)))
        .collect()
}

/// Wait for all drainers and merge their reports
pub async fn collect(drainers: Vec<JoinHandle<VerificationReport>>) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();
    for (shard, result) in futures::future::join_all(drainers).await.into_iter().enumerate() {
        let partial = result.map_err(|_| BridgeError::WorkerPanicked(shard))?;
        report.merge(partial);
    }
    Ok(report)
}
