// src/utils/config.rs
//! Layered configuration
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. config file (`$BRIDGE_CONFIG`, else `bridge.toml` if present)
//! 3. environment, e.g. `BRIDGE_DISPATCH__WORKERS=8`

use crate::dispatch::worker_pool::DispatchConfig;
use crate::harness::seed::HarnessConfig;
use crate::observability::ObservabilityConfig;
use crate::runtime::guest_module::RuntimeConfig;
use crate::utils::errors::{BridgeError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "BRIDGE_CONFIG";

/// Config file used when `BRIDGE_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "bridge.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub runtime: RuntimeConfig,
    pub dispatch: DispatchConfig,
    pub harness: HarnessConfig,
    pub observability: ObservabilityConfig,
}

impl BridgeConfig {
    /// Load from the default file location and the environment
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::build(&path, true),
            Err(_) => Self::build(DEFAULT_CONFIG_FILE, false),
        }
    }

    /// Load from an explicit file plus the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(&path.as_ref().to_string_lossy(), true)
    }

    fn build(path: &str, required: bool) -> Result<Self> {
        debug!("Reading configuration from {} (required: {})", path, required);

        let config: BridgeConfig = Config::builder()
            .add_source(File::with_name(path).required(required))
            .add_source(
                Environment::with_prefix("BRIDGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()?;
        self.harness.validate()?;
        self.runtime.limits.validate().map_err(BridgeError::ConfigError)?;
        if self.runtime.allocator_export.is_empty() || self.runtime.entry_export.is_empty() {
            return Err(BridgeError::ConfigError("Guest export names cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::worker_pool::Transport;
    use crate::runtime::instance_pool::InstanceMode;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.workers, 25);
        assert_eq!(config.harness.work, 100_000);
        assert_eq!(config.harness.payload_size, 4096);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[runtime]
entry_export = "handle"
instance_mode = "shared"
inherit_stdin = false

[runtime.limits]
invocation_timeout_ms = 250

[dispatch]
workers = 4
transport = "stdin"

[harness]
work = 16
seed = 42
"#
        )
        .unwrap();

        let config = BridgeConfig::load_from(file.path()).unwrap();
        assert_eq!(config.runtime.entry_export, "handle");
        assert_eq!(config.runtime.allocator_export, "my_malloc");
        assert_eq!(config.runtime.instance_mode, InstanceMode::Shared);
        assert!(!config.runtime.inherit_stdin);
        assert!(config.runtime.inherit_stdout);
        assert_eq!(config.runtime.limits.invocation_timeout_ms, Some(250));
        assert_eq!(config.dispatch.workers, 4);
        assert_eq!(config.dispatch.transport, Transport::Stdin);
        assert_eq!(config.harness.work, 16);
        assert_eq!(config.harness.seed, Some(42));
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[dispatch]\nworkers = 1000").unwrap();

        let err = BridgeConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigError(_)));
    }

    #[test]
    fn test_environment_overrides_file() {
        // Keys no other test reads, since the environment is process-wide
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[harness]\npayload_size = 64\n\n[runtime]\nmount_point = \"/sandbox\"").unwrap();

        std::env::set_var("BRIDGE_HARNESS__PAYLOAD_SIZE", "1234");
        std::env::set_var("BRIDGE_RUNTIME__RELEASE_EXPORT", "my_free");
        let loaded = BridgeConfig::load_from(file.path());
        std::env::remove_var("BRIDGE_HARNESS__PAYLOAD_SIZE");
        std::env::remove_var("BRIDGE_RUNTIME__RELEASE_EXPORT");

        let config = loaded.unwrap();
        assert_eq!(config.harness.payload_size, 1234);
        assert_eq!(config.runtime.release_export.as_deref(), Some("my_free"));
        assert_eq!(config.runtime.mount_point, "/sandbox");
    }

    #[test]
    fn test_missing_required_file() {
        assert!(BridgeConfig::load_from("/nonexistent/bridge.toml").is_err());
    }
}
