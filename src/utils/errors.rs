// src/utils/errors.rs
//! Error types for the sandbox bridge
//!
//! Registry errors are local and recoverable: the caller decides whether to
//! skip the task. Memory-bridge protocol errors are fatal to the worker that
//! hit them because they mean allocator and writer have desynchronized.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error taxonomy
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Second registration of the same task id
    #[error("Task id already registered: {0}")]
    AlreadyRegistered(String),

    /// Open of a task id that was never registered
    #[error("Virtual file not found: {0}")]
    NotFound(String),

    /// Malformed virtual path (wrong segment count or unknown direction)
    #[error("Permission denied for virtual path: {0}")]
    PermissionDenied(String),

    /// Task id that could never be resolved through a virtual path
    #[error("Invalid task id {0:?}: must be non-empty and contain no '/'")]
    InvalidTaskId(String),

    /// Input slot given a write file, or output slot given a read file
    #[error("Direction mismatch for task {task_id}: {slot} file must be {expected}")]
    DirectionMismatch {
        task_id: String,
        slot: &'static str,
        expected: &'static str,
    },

    /// Task id queued for dispatch without a registration
    #[error("Task {0} queued for dispatch but never registered")]
    UnregisteredTask(String),

    /// Same task id queued twice
    #[error("Duplicate task id in work queue: {0}")]
    DuplicateTask(String),

    /// Write targeting guest memory past its mapped size
    #[error("Guest memory write out of range: ptr={ptr} len={len} memory_size={memory_size}")]
    MemoryOutOfRange {
        ptr: u32,
        len: usize,
        memory_size: usize,
    },

    /// Guest export call trapped or errored
    #[error("Guest invocation of `{export}` failed: {reason}")]
    GuestInvocationFailure { export: String, reason: String },

    /// Guest export call exceeded the configured deadline
    #[error("Guest invocation of `{export}` exceeded {timeout_ms}ms")]
    InvocationTimeout { export: String, timeout_ms: u64 },

    /// Guest module lacks an export the bridge depends on
    #[error("Guest export missing or mistyped: {0}")]
    MissingExport(String),

    /// Guest artifact failed to compile
    #[error("Guest compilation failed: {0}")]
    CompileFailed(String),

    /// Guest instance could not be created
    #[error("Guest instantiation failed: {0}")]
    InstantiationFailed(String),

    /// Shared instance refused further work after an earlier fatal error
    #[error("Shared guest instance is poisoned: {0}")]
    InstancePoisoned(String),

    /// Payload does not fit in a 32-bit guest address space
    #[error("Payload of {0} bytes exceeds guest address space")]
    PayloadTooLarge(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error must stop the worker's shard instead of skipping one task
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::MemoryOutOfRange { .. }
                | BridgeError::MissingExport(_)
                | BridgeError::InstantiationFailed(_)
                | BridgeError::InstancePoisoned(_)
        )
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let oor = BridgeError::MemoryOutOfRange {
            ptr: 70_000,
            len: 26,
            memory_size: 65_536,
        };
        assert!(oor.is_fatal());

        let trap = BridgeError::GuestInvocationFailure {
            export: "do".to_string(),
            reason: "unreachable".to_string(),
        };
        assert!(!trap.is_fatal());
        assert!(BridgeError::InstancePoisoned("bad write".to_string()).is_fatal());
        assert!(!BridgeError::NotFound("in/x".to_string()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = BridgeError::AlreadyRegistered("abc".to_string());
        assert_eq!(err.to_string(), "Task id already registered: abc");
    }
}
