// src/runtime/guest_runtime.rs
//! Runtime instance lifecycle
//!
//! One instance owns one wasmtime store: a private linear memory, its WASI
//! context with the registry preopened, and typed handles to the allocator
//! and entry exports. Instances are cheap to create from a compiled
//! [`GuestModule`] and are driven synchronously through [`GuestBridge`].

use crate::runtime::guest_module::{mount_registry, GuestModule, GuestState};
use crate::runtime::memory_bridge::{GuestAllocation, GuestBridge};
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::registry::FilesystemRegistry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};
use wasi_common::pipe::ReadPipe;
use wasi_common::sync::WasiCtxBuilder;
use wasi_common::I32Exit;
use wasmtime::{Memory, Store, Trap, TypedFunc};

/// Export called once after instantiation when present (WASI reactor)
const INITIALIZE_EXPORT: &str = "_initialize";

/// Export running the guest's command main
const START_EXPORT: &str = "_start";

/// Handle describing a live instance
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    /// Owning worker, or `None` for a shared instance
    pub worker: Option<usize>,

    /// Created timestamp
    pub started_at: Instant,
}

/// One isolated guest execution environment
pub struct RuntimeInstance {
    handle: RuntimeHandle,
    store: Store<GuestState>,
    memory: Memory,
    allocator: TypedFunc<u32, u32>,
    entry: TypedFunc<(u32, u32), ()>,
    release: Option<TypedFunc<u32, ()>>,
    start: Option<TypedFunc<(), ()>>,
    export_names: ExportNames,
    deadline_ticks: Option<u64>,
    timeout_ms: u64,
    dispatch_count: u64,
}

#[derive(Debug, Clone)]
struct ExportNames {
    allocator: String,
    entry: String,
    release: Option<String>,
}

impl RuntimeInstance {
    /// Instantiate the guest with the registry as its filesystem
    pub fn new(worker: Option<usize>, module: &GuestModule, registry: Arc<FilesystemRegistry>) -> Result<Self> {
        Self::build(worker, module, registry, None)
    }

    /// Instantiate the guest with `stdin` fed to its standard input
    pub fn with_stdin(
        worker: Option<usize>,
        module: &GuestModule,
        registry: Arc<FilesystemRegistry>,
        stdin: Vec<u8>,
    ) -> Result<Self> {
        Self::build(worker, module, registry, Some(stdin))
    }

    fn build(
        worker: Option<usize>,
        module: &GuestModule,
        registry: Arc<FilesystemRegistry>,
        stdin: Option<Vec<u8>>,
    ) -> Result<Self> {
        let config = module.config();
        debug!("Instantiating guest for worker {:?}", worker);

        let mut builder = WasiCtxBuilder::new();
        if config.inherit_stdin && stdin.is_none() {
            builder.inherit_stdin();
        }
        if config.inherit_stdout {
            builder.inherit_stdout();
        }
        if config.inherit_stderr {
            builder.inherit_stderr();
        }
        let mut wasi = builder.build();
        if let Some(bytes) = stdin {
            wasi.set_stdin(Box::new(ReadPipe::from(bytes)));
        }
        mount_registry(&mut wasi, registry, &config.mount_point)?;

        let mut store = Store::new(
            module.engine(),
            GuestState {
                wasi,
                limits: config.limits.store_limits(),
            },
        );
        store.limiter(|state| &mut state.limits);

        let deadline_ticks = config.limits.deadline_ticks();
        if let Some(ticks) = deadline_ticks {
            store.epoch_deadline_trap();
            store.set_epoch_deadline(ticks);
        }

        let instance = module
            .instance_pre()
            .instantiate(&mut store)
            .map_err(|e| BridgeError::InstantiationFailed(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, &config.memory_export)
            .ok_or_else(|| BridgeError::MissingExport(format!("memory `{}`", config.memory_export)))?;

        let allocator = instance
            .get_typed_func::<u32, u32>(&mut store, &config.allocator_export)
            .map_err(|e| BridgeError::MissingExport(format!("`{}`: {}", config.allocator_export, e)))?;

        let entry = instance
            .get_typed_func::<(u32, u32), ()>(&mut store, &config.entry_export)
            .map_err(|e| BridgeError::MissingExport(format!("`{}`: {}", config.entry_export, e)))?;

        let release = match &config.release_export {
            Some(name) => Some(
                instance
                    .get_typed_func::<u32, ()>(&mut store, name)
                    .map_err(|e| BridgeError::MissingExport(format!("`{}`: {}", name, e)))?,
            ),
            None => None,
        };

        let start = instance
            .get_typed_func::<(), ()>(&mut store, START_EXPORT)
            .ok();

        let mut runtime = Self {
            handle: RuntimeHandle {
                worker,
                started_at: Instant::now(),
            },
            store,
            memory,
            allocator,
            entry,
            release,
            start,
            export_names: ExportNames {
                allocator: config.allocator_export.clone(),
                entry: config.entry_export.clone(),
                release: config.release_export.clone(),
            },
            deadline_ticks,
            timeout_ms: config.limits.invocation_timeout_ms.unwrap_or(0),
            dispatch_count: 0,
        };

        if let Ok(init) = instance.get_typed_func::<(), ()>(&mut runtime.store, INITIALIZE_EXPORT) {
            runtime.arm_deadline();
            init.call(&mut runtime.store, ())
                .map_err(|e| BridgeError::InstantiationFailed(format!("{} trapped: {}", INITIALIZE_EXPORT, e)))?;
        }

        Ok(runtime)
    }

    /// Run the guest's `_start`; exit code 0 counts as success
    pub fn run_command(&mut self) -> Result<()> {
        let start = self
            .start
            .clone()
            .ok_or_else(|| BridgeError::MissingExport(format!("`{}`", START_EXPORT)))?;

        self.arm_deadline();
        let err = match start.call(&mut self.store, ()) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if let Some(exit) = err.downcast_ref::<I32Exit>() {
            if exit.0 == 0 {
                return Ok(());
            }
        }
        Err(self.classify(START_EXPORT, err))
    }

    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Number of completed dispatches
    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }

    /// Current guest memory size in bytes
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    fn arm_deadline(&mut self) {
        if let Some(ticks) = self.deadline_ticks {
            self.store.set_epoch_deadline(ticks);
        }
    }

    fn classify(&self, export: &str, err: wasmtime::Error) -> BridgeError {
        if matches!(err.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
            return BridgeError::InvocationTimeout {
                export: export.to_string(),
                timeout_ms: self.timeout_ms,
            };
        }
        BridgeError::GuestInvocationFailure {
            export: export.to_string(),
            reason: format!("{:#}", err),
        }
    }
}

impl GuestBridge for RuntimeInstance {
    fn allocate(&mut self, size: u32) -> Result<GuestAllocation> {
        self.arm_deadline();
        let ptr = self
            .allocator
            .call(&mut self.store, size)
            .map_err(|e| self.classify(&self.export_names.allocator, e))?;

        trace!("Guest allocated {} bytes at {:#x}", size, ptr);
        Ok(GuestAllocation { ptr, len: size })
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<()> {
        self.memory
            .write(&mut self.store, ptr as usize, bytes)
            .map_err(|_| BridgeError::MemoryOutOfRange {
                ptr,
                len: bytes.len(),
                memory_size: self.memory.data_size(&self.store),
            })
    }

    fn invoke(&mut self, ptr: u32, len: u32) -> Result<()> {
        self.arm_deadline();
        self.entry
            .call(&mut self.store, (ptr, len))
            .map_err(|e| self.classify(&self.export_names.entry, e))?;

        self.dispatch_count += 1;
        Ok(())
    }

    fn release(&mut self, allocation: GuestAllocation) -> Result<()> {
        let Some(release) = self.release.clone() else {
            return Ok(());
        };

        self.arm_deadline();
        release.call(&mut self.store, allocation.ptr).map_err(|e| {
            let name = self.export_names.release.as_deref().unwrap_or("release");
            self.classify(name, e)
        })
    }
}
