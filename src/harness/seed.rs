// src/harness/seed.rs
//! Batch seeding
//!
//! Every task gets a random input payload served from memory and an output
//! writer feeding a bounded pipe. The host keeps the pipe's read end and the
//! seeded payload so a drainer can compare them later.

use crate::dispatch::shard::ShardPlan;
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::TaskId;
use crate::vfs::pipe::{pipe, PipeReader};
use crate::vfs::registry::FilesystemRegistry;
use crate::vfs::virtual_file::VirtualFile;
use bytes::{Buf, Bytes};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Harness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Number of tasks in the batch
    pub work: usize,

    /// Random input bytes per task
    pub payload_size: usize,

    /// Output pipe capacity in chunks; 0 makes every write a handoff
    pub pipe_capacity: usize,

    /// RNG seed for reproducible payloads
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            work: 100_000,
            payload_size: 4096,
            pipe_capacity: 1,
            seed: None,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.work == 0 {
            return Err(BridgeError::ConfigError("Batch must contain at least one task".to_string()));
        }
        Ok(())
    }
}

/// Host-side view of one task: what went in, and where it comes out
pub struct Expected {
    pub task_id: TaskId,
    pub payload: Bytes,
    pub output: PipeReader,
}

/// Registered batch ready to dispatch
pub struct SeededBatch {
    pub registry: Arc<FilesystemRegistry>,
    pub plan: ShardPlan,

    /// Expectations grouped by shard, in shard order
    pub expectations: Vec<Vec<Expected>>,
}

impl SeededBatch {
    /// Register the given payloads and split them across `workers`
    pub fn from_payloads(
        payloads: impl IntoIterator<Item = (TaskId, Bytes)>,
        workers: usize,
        pipe_capacity: usize,
    ) -> Result<Self> {
        let registry = Arc::new(FilesystemRegistry::new());
        let mut ids = Vec::new();
        let mut pending = HashMap::new();

        for (task_id, payload) in payloads {
            let (writer, reader) = pipe(pipe_capacity);
            registry.register(
                task_id.clone(),
                VirtualFile::reader("in", payload.clone().reader()),
                VirtualFile::writer("out", writer),
            )?;
            ids.push(task_id.clone());
            pending.insert(task_id, (payload, reader));
        }

        let plan = ShardPlan::round_robin(ids, workers)?;
        let mut expectations = Vec::with_capacity(plan.workers());
        for shard in plan.shards() {
            let mut expected = Vec::with_capacity(shard.len());
            for task_id in shard {
                if let Some((payload, output)) = pending.remove(task_id) {
                    expected.push(Expected {
                        task_id: task_id.clone(),
                        payload,
                        output,
                    });
                }
            }
            expectations.push(expected);
        }

        debug!("Registered {} tasks", registry.len());

        Ok(Self {
            registry,
            plan,
            expectations,
        })
    }

    pub fn len(&self) -> usize {
        self.plan.total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generate `config.work` tasks with fresh ids and random payloads
pub fn seed(config: &HarnessConfig, workers: usize) -> Result<SeededBatch> {
    config.validate()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        "Seeding {} tasks of {} bytes across {} workers",
        config.work, config.payload_size, workers
    );

    let payloads = (0..config.work).map(|_| {
        let mut payload = vec![0u8; config.payload_size];
        rng.fill_bytes(&mut payload);
        (TaskId::generate(), Bytes::from(payload))
    });

    SeededBatch::from_payloads(payloads, workers, config.pipe_capacity)
}
