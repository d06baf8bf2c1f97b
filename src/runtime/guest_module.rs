// src/runtime/guest_module.rs
//! Compiled guest artifact shared by every runtime instance
//!
//! Compilation and WASI linking happen once per batch; workers only pay for
//! instantiation. The engine is configured for epoch interruption when an
//! invocation timeout is set, in which case a background ticker advances the
//! epoch for as long as the module is alive.

use crate::harness::guests::REFERENCE_COPY_GUEST;
use crate::runtime::instance_pool::InstanceMode;
use crate::runtime::resource_limiter::{EpochTicker, GuestLimits};
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::registry::FilesystemRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use wasi_common::WasiCtx;
use wasmtime::{Config, Engine, InstancePre, Linker, Module, StoreLimits};

/// Configuration for guest compilation and instantiation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the guest `.wasm` (or `.wat`); `None` uses the built-in copy guest
    pub guest_path: Option<PathBuf>,

    /// Allocator export: `(size: i32) -> i32`
    pub allocator_export: String,

    /// Entry point export: `(ptr: i32, len: i32) -> ()`
    pub entry_export: String,

    /// Optional release export: `(ptr: i32) -> ()`, called after each dispatch
    pub release_export: Option<String>,

    /// Linear memory export
    pub memory_export: String,

    /// Guest path at which the virtual filesystem is preopened
    pub mount_point: String,

    /// Pass host stdin through to the guest; ignored when a transport supplies stdin
    pub inherit_stdin: bool,

    /// Pass host stdout through to the guest
    pub inherit_stdout: bool,

    /// Pass host stderr through to the guest
    pub inherit_stderr: bool,

    /// One instance per worker, or one instance shared under a lock
    pub instance_mode: InstanceMode,

    /// Memory and time limits
    pub limits: GuestLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            guest_path: None,
            allocator_export: "my_malloc".to_string(),
            entry_export: "do".to_string(),
            release_export: None,
            memory_export: "memory".to_string(),
            mount_point: "/".to_string(),
            inherit_stdin: true,
            inherit_stdout: true,
            inherit_stderr: true,
            instance_mode: InstanceMode::Exclusive,
            limits: GuestLimits::default(),
        }
    }
}

/// Per-store host state
pub struct GuestState {
    pub(crate) wasi: WasiCtx,
    pub(crate) limits: StoreLimits,
}

/// Compiled guest plus the linker state needed to instantiate it
pub struct GuestModule {
    config: RuntimeConfig,
    engine: Engine,
    module: Module,
    pre: InstancePre<GuestState>,
    _ticker: Option<EpochTicker>,
}

impl GuestModule {
    /// Load the configured guest, or the built-in copy guest when none is set
    pub fn load(config: RuntimeConfig) -> Result<Self> {
        match config.guest_path.clone() {
            Some(path) => Self::from_file(config, &path),
            None => Self::reference(config),
        }
    }

    /// Compile a guest from disk
    pub fn from_file(config: RuntimeConfig, path: &Path) -> Result<Self> {
        info!("Loading guest module from {:?}", path);
        let bytes = std::fs::read(path).map_err(|e| {
            BridgeError::CompileFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(config, &bytes)
    }

    /// Built-in guest copying `in/<id>` to `out/<id>`
    pub fn reference(config: RuntimeConfig) -> Result<Self> {
        debug!("Using built-in reference copy guest");
        Self::from_bytes(config, REFERENCE_COPY_GUEST.as_bytes())
    }

    /// Compile a guest from wasm binary or WAT text
    pub fn from_bytes(config: RuntimeConfig, bytes: &[u8]) -> Result<Self> {
        config.limits.validate().map_err(BridgeError::ConfigError)?;

        let timeouts = config.limits.invocation_timeout_ms.is_some();
        let mut wasmtime_config = Config::new();
        wasmtime_config.epoch_interruption(timeouts);

        let engine = Engine::new(&wasmtime_config)
            .map_err(|e| BridgeError::CompileFailed(format!("Failed to init engine: {}", e)))?;

        let module = Module::new(&engine, bytes)
            .map_err(|e| BridgeError::CompileFailed(e.to_string()))?;

        let mut linker: Linker<GuestState> = Linker::new(&engine);
        wasi_common::sync::add_to_linker(&mut linker, |state: &mut GuestState| &mut state.wasi)
            .map_err(|e| BridgeError::InstantiationFailed(format!("Failed to link WASI: {}", e)))?;

        let pre = linker
            .instantiate_pre(&module)
            .map_err(|e| BridgeError::InstantiationFailed(e.to_string()))?;

        let ticker = if timeouts {
            Some(EpochTicker::start(engine.clone())?)
        } else {
            None
        };

        info!(
            "Guest module compiled ({} imports, {} exports)",
            module.imports().len(),
            module.exports().len()
        );

        Ok(Self {
            config,
            engine,
            module,
            pre,
            _ticker: ticker,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn instance_pre(&self) -> &InstancePre<GuestState> {
        &self.pre
    }

    /// Whether the guest exports a function with this name
    pub fn has_export(&self, name: &str) -> bool {
        self.module.get_export(name).is_some()
    }
}

/// Preopen the registry as the guest's only directory
pub(crate) fn mount_registry(
    wasi: &mut WasiCtx,
    registry: Arc<FilesystemRegistry>,
    mount_point: &str,
) -> Result<()> {
    wasi.push_preopened_dir(
        Box::new(crate::vfs::wasi_dir::RegistryDir::new(registry)),
        mount_point,
    )
    .map_err(|e| BridgeError::InstantiationFailed(format!("Failed to preopen {}: {}", mount_point, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.allocator_export, "my_malloc");
        assert_eq!(config.entry_export, "do");
        assert_eq!(config.mount_point, "/");
        assert_eq!(config.instance_mode, InstanceMode::Exclusive);
        assert!(config.guest_path.is_none());
        assert!(config.inherit_stdin && config.inherit_stdout && config.inherit_stderr);
    }

    #[test]
    fn test_reference_guest_compiles() {
        let module = GuestModule::reference(RuntimeConfig::default()).unwrap();
        assert!(module.has_export("my_malloc"));
        assert!(module.has_export("do"));
        assert!(module.has_export("memory"));
        assert!(module.has_export("_start"));
    }

    #[test]
    fn test_invalid_bytes_fail_to_compile() {
        let err = GuestModule::from_bytes(RuntimeConfig::default(), b"not wasm")
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::CompileFailed(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = GuestModule::from_file(
            RuntimeConfig::default(),
            Path::new("/nonexistent/guest.wasm"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, BridgeError::CompileFailed(_)));
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut config = RuntimeConfig::default();
        config.limits.memory_limit_mb = Some(0);
        let err = GuestModule::reference(config).err().unwrap();
        assert!(matches!(err, BridgeError::ConfigError(_)));
    }
}
