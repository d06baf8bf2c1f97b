// src/lib.rs
//! Sandbox Bridge Library
//!
//! Runs a WebAssembly guest over a large batch of independent tasks. Each
//! task gets a private input and output stream in a virtual filesystem; the
//! host hands the guest a task id through its linear memory and the guest
//! streams the input to the output.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **vfs**: virtual files, bounded pipes, the task registry and its WASI view
//! - **runtime**: guest compilation, instances, memory bridge, limits
//! - **dispatch**: round-robin shards and the blocking worker pool
//! - **harness**: batch seeding, output verification, built-in guests
//! - **observability**: tracing and metrics setup
//! - **utils**: errors and configuration

// Public module exports
pub mod dispatch;
pub mod harness;
pub mod observability;
pub mod runtime;
pub mod utils;
pub mod vfs;

// Re-export commonly used types
pub use dispatch::{ShardPlan, WorkerPool};
pub use harness::{run_batch, BatchReport};
pub use runtime::{GuestModule, InstancePool, RuntimeInstance};
pub use utils::config::BridgeConfig;
pub use utils::errors::{BridgeError, Result};
pub use vfs::{FilesystemRegistry, TaskId, VirtualFile};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
