// src/dispatch/shard.rs
//! Static round-robin assignment of task ids to workers
//!
//! ```text
//! ids:     t0 t1 t2 t3 t4 t5 t6
//! shard 0: t0 t3 t6
//! shard 1: t1 t4
//! shard 2: t2 t5
//! ```
//!
//! Assignment is fixed up front. No shard ever takes work from another.

use crate::dispatch::worker_pool::MAX_WORKERS;
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::TaskId;
use std::collections::HashSet;

/// Ordered, disjoint partition of a batch across workers
#[derive(Debug, Clone)]
pub struct ShardPlan {
    shards: Vec<Vec<TaskId>>,
}

impl ShardPlan {
    /// Id at position `i` goes to shard `i % workers`
    pub fn round_robin(ids: impl IntoIterator<Item = TaskId>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(BridgeError::ConfigError("Worker count must be at least 1".to_string()));
        }
        if workers > MAX_WORKERS {
            return Err(BridgeError::ConfigError(format!(
                "Worker count {} exceeds maximum of {}",
                workers, MAX_WORKERS
            )));
        }

        let mut shards = vec![Vec::new(); workers];
        let mut seen = HashSet::new();
        for (i, id) in ids.into_iter().enumerate() {
            if !seen.insert(id.clone()) {
                return Err(BridgeError::DuplicateTask(id.to_string()));
            }
            shards[i % workers].push(id);
        }

        Ok(Self { shards })
    }

    pub fn shards(&self) -> &[Vec<TaskId>] {
        &self.shards
    }

    pub fn shard(&self, worker: usize) -> &[TaskId] {
        self.shards.get(worker).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn workers(&self) -> usize {
        self.shards.len()
    }

    /// Total number of ids across all shards
    pub fn total(&self) -> usize {
        self.shards.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.shards.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<TaskId> {
        (0..n).map(|i| TaskId::from(format!("t{}", i))).collect()
    }

    #[test]
    fn test_hundred_ids_four_workers() {
        let plan = ShardPlan::round_robin(ids(100), 4).unwrap();

        assert_eq!(plan.workers(), 4);
        assert_eq!(plan.total(), 100);
        for worker in 0..4 {
            let shard = plan.shard(worker);
            assert_eq!(shard.len(), 25);
            for (k, id) in shard.iter().enumerate() {
                assert_eq!(id.as_str(), format!("t{}", worker + 4 * k));
            }
        }
    }

    #[test]
    fn test_shards_are_disjoint_and_complete() {
        let plan = ShardPlan::round_robin(ids(37), 5).unwrap();
        let mut all: Vec<_> = plan.iter().map(|id| id.to_string()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 37);

        // Uneven split: first two shards get one extra
        assert_eq!(plan.shard(0).len(), 8);
        assert_eq!(plan.shard(1).len(), 8);
        assert_eq!(plan.shard(4).len(), 7);
    }

    #[test]
    fn test_more_workers_than_ids() {
        let plan = ShardPlan::round_robin(ids(2), 4).unwrap();
        assert_eq!(plan.shard(2).len(), 0);
        assert_eq!(plan.shard(3).len(), 0);
        assert!(plan.shard(9).is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = ShardPlan::round_robin(ids(3), 0).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigError(_)));
    }

    #[test]
    fn test_worker_count_capped() {
        let plan = ShardPlan::round_robin(ids(MAX_WORKERS * 2), MAX_WORKERS).unwrap();
        assert_eq!(plan.workers(), MAX_WORKERS);

        let err = ShardPlan::round_robin(ids(600), MAX_WORKERS + 1).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigError(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut batch = ids(3);
        batch.push(TaskId::from("t1"));
        let err = ShardPlan::round_robin(batch, 2).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateTask(id) if id == "t1"));
    }
}
