// src/observability/mod.rs
//! Logging and metrics setup
//!
//! Logging goes through `tracing`. `RUST_LOG` wins over the configured
//! level when set. Metrics use the `metrics` facade with a Prometheus
//! recorder installed on demand.

use crate::utils::errors::{BridgeError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Observability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,

    /// Install the Prometheus recorder
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics: false,
        }
    }
}

/// Install the global tracing subscriber
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| BridgeError::ConfigError(format!("Invalid log level {:?}: {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| BridgeError::ConfigError(format!("Failed to install tracing subscriber: {}", e)))
}

/// Install the Prometheus recorder behind the `metrics` facade
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| BridgeError::ConfigError(format!("Failed to install metrics recorder: {}", e)))
}
