// src/dispatch/mod.rs
//! Batch dispatch across a fixed set of blocking workers
//!
//! - [`shard`] splits a batch round-robin into disjoint shards
//! - [`worker_pool`] runs one worker per shard through the entry export
//! - [`stdin_transport`] runs each shard through the guest's `_start`

pub mod shard;
pub mod stdin_transport;
pub mod worker_pool;

pub use shard::ShardPlan;
pub use stdin_transport::run_stdin_transport;
pub use worker_pool::{DispatchConfig, PoolReport, TaskDispatcher, Transport, WorkerPool, WorkerReport};
