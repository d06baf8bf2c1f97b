// src/runtime/instance_pool.rs
//! Hands runtime instances to workers
//!
//! Two policies:
//!
//! ```text
//! Exclusive (default)             Shared
//! worker 0 → Instance 0           worker 0 ─┐
//! worker 1 → Instance 1           worker 1 ─┼─→ Mutex<Instance>
//! worker 2 → Instance 2           worker 2 ─┘
//! ```
//!
//! Exclusive instances need no lock at all. A shared instance is guarded by
//! one mutex held across allocate, write, invoke and release, so two task ids
//! never interleave on the same linear memory. The first fatal error poisons
//! a shared instance: every later dispatch from any worker fails fast with
//! [`BridgeError::InstancePoisoned`].

use crate::dispatch::worker_pool::TaskDispatcher;
use crate::runtime::guest_module::GuestModule;
use crate::runtime::guest_runtime::RuntimeInstance;
use crate::runtime::memory_bridge::GuestBridge;
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::TaskId;
use crate::vfs::registry::FilesystemRegistry;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Instance ownership policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceMode {
    Exclusive,
    Shared,
}

/// Instance held by one worker for the duration of its shard
pub enum WorkerInstance {
    Exclusive(RuntimeInstance),
    Shared(Arc<SharedInstance>),
}

impl TaskDispatcher for WorkerInstance {
    fn dispatch(&mut self, task_id: &TaskId) -> Result<()> {
        match self {
            WorkerInstance::Exclusive(instance) => instance.dispatch(task_id),
            WorkerInstance::Shared(shared) => shared.dispatch(task_id),
        }
    }
}

/// One instance driven by every worker in turn
pub struct SharedInstance {
    state: Mutex<SharedState>,
}

struct SharedState {
    instance: RuntimeInstance,
    poisoned: Option<String>,
}

impl SharedInstance {
    fn new(instance: RuntimeInstance) -> Self {
        Self {
            state: Mutex::new(SharedState {
                instance,
                poisoned: None,
            }),
        }
    }

    /// Run one task with the whole composite under one guard
    pub fn dispatch(&self, task_id: &TaskId) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.poisoned {
            return Err(BridgeError::InstancePoisoned(reason.clone()));
        }

        let result = state.instance.dispatch(task_id);
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("Shared instance poisoned by task {}: {}", task_id, err);
                metrics::counter!("bridge_instance_poisoned_total").increment(1);
                state.poisoned = Some(err.to_string());
            }
        }
        result
    }

    /// Error that poisoned this instance, if any
    pub fn poisoned(&self) -> Option<String> {
        self.state.lock().poisoned.clone()
    }
}

/// Builds or lends runtime instances according to [`InstanceMode`]
pub struct InstancePool {
    module: Arc<GuestModule>,
    registry: Arc<FilesystemRegistry>,
    mode: InstanceMode,
    shared: OnceCell<Arc<SharedInstance>>,
    created: AtomicUsize,
}

impl InstancePool {
    pub fn new(module: Arc<GuestModule>, registry: Arc<FilesystemRegistry>) -> Self {
        let mode = module.config().instance_mode;
        info!("Instance pool ready in {:?} mode", mode);

        Self {
            module,
            registry,
            mode,
            shared: OnceCell::new(),
            created: AtomicUsize::new(0),
        }
    }

    /// Instance for `worker` to drive its shard
    pub fn acquire(&self, worker: usize) -> Result<WorkerInstance> {
        match self.mode {
            InstanceMode::Exclusive => {
                let instance = RuntimeInstance::new(Some(worker), &self.module, Arc::clone(&self.registry))?;
                self.created.fetch_add(1, Ordering::Relaxed);
                debug!("Worker {} acquired exclusive instance", worker);
                Ok(WorkerInstance::Exclusive(instance))
            }
            InstanceMode::Shared => {
                let shared = self.shared.get_or_try_init(|| {
                    let instance = RuntimeInstance::new(None, &self.module, Arc::clone(&self.registry))?;
                    self.created.fetch_add(1, Ordering::Relaxed);
                    Ok::<_, BridgeError>(Arc::new(SharedInstance::new(instance)))
                })?;
                debug!("Worker {} acquired shared instance", worker);
                Ok(WorkerInstance::Shared(Arc::clone(shared)))
            }
        }
    }

    /// Exclusive instance fed `stdin`, for the stdin transport
    pub fn acquire_with_stdin(&self, worker: usize, stdin: Vec<u8>) -> Result<RuntimeInstance> {
        let instance = RuntimeInstance::with_stdin(Some(worker), &self.module, Arc::clone(&self.registry), stdin)?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(instance)
    }

    pub fn registry(&self) -> &Arc<FilesystemRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> InstancePoolStats {
        InstancePoolStats {
            mode: self.mode,
            instances_created: self.created.load(Ordering::Relaxed),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct InstancePoolStats {
    pub mode: InstanceMode,
    pub instances_created: usize,
}
