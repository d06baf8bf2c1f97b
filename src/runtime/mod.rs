// src/runtime/mod.rs
//! Guest execution runtime
//!
//! This module provides the wasm side of the bridge:
//!
//! - **Guest Module**: compiled guest plus WASI linking, shared by all instances
//! - **Runtime Instance**: one store with its own linear memory
//! - **Memory Bridge**: allocate / write / invoke calling convention
//! - **Instance Pool**: exclusive or shared instance policy
//! - **Resource Limiter**: memory caps and epoch-based timeouts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              GuestModule (compiled once)     │
//! │                      │                       │
//! │         ┌────────────┼────────────┐          │
//! │         ▼            ▼            ▼          │
//! │    ┌─────────┐  ┌─────────┐  ┌─────────┐     │
//! │    │Instance0│  │Instance1│  │Instance2│ ... │
//! │    │ memory  │  │ memory  │  │ memory  │     │
//! │    └─────────┘  └─────────┘  └─────────┘     │
//! │         ▲            ▲            ▲          │
//! │      worker 0     worker 1     worker 2      │
//! └──────────────────────────────────────────────┘
//! ```

pub mod guest_module;
pub mod guest_runtime;
pub mod instance_pool;
pub mod memory_bridge;
pub mod resource_limiter;

// Re-export commonly used types
pub use guest_module::{GuestModule, RuntimeConfig};
pub use guest_runtime::{RuntimeHandle, RuntimeInstance};
pub use instance_pool::{InstanceMode, InstancePool, InstancePoolStats, SharedInstance, WorkerInstance};
pub use memory_bridge::{GuestAllocation, GuestBridge};
pub use resource_limiter::{EpochTicker, GuestLimits};
