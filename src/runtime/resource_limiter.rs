// src/runtime/resource_limiter.rs
//! Resource limits for guest instances
//!
//! Provides:
//! - linear memory cap per instance (wasmtime `StoreLimits`)
//! - optional per-invocation timeout (epoch interruption)

use crate::utils::errors::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wasmtime::{Engine, StoreLimits, StoreLimitsBuilder};

/// Granularity of the epoch clock driving invocation timeouts
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Wasm page size in bytes
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

/// Limits applied to every guest instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestLimits {
    /// Linear memory cap in megabytes
    /// Example: 64 = guest may grow to 1024 pages
    pub memory_limit_mb: Option<u64>,

    /// Per-invocation deadline in milliseconds; `None` blocks indefinitely
    pub invocation_timeout_ms: Option<u64>,
}

impl Default for GuestLimits {
    fn default() -> Self {
        Self {
            memory_limit_mb: Some(256),
            invocation_timeout_ms: None,
        }
    }
}

impl GuestLimits {
    /// No memory cap, no timeout
    pub fn unlimited() -> Self {
        Self {
            memory_limit_mb: None,
            invocation_timeout_ms: None,
        }
    }

    /// Tight limits for untrusted guests
    pub fn strict() -> Self {
        Self {
            memory_limit_mb: Some(16),
            invocation_timeout_ms: Some(5_000),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(memory) = self.memory_limit_mb {
            if memory == 0 {
                return Err("Guest memory limit cannot be 0".to_string());
            }
            if memory > 4096 {
                return Err("Guest memory limit cannot exceed 4GB (32-bit address space)".to_string());
            }
        }

        if let Some(timeout) = self.invocation_timeout_ms {
            if timeout == 0 {
                return Err("Invocation timeout cannot be 0".to_string());
            }
        }

        Ok(())
    }

    /// Store limiter enforcing the memory cap
    pub fn store_limits(&self) -> StoreLimits {
        let mut builder = StoreLimitsBuilder::new();
        if let Some(memory) = self.memory_limit_mb {
            builder = builder.memory_size((memory * 1024 * 1024) as usize);
        }
        builder.build()
    }

    /// Epoch ticks corresponding to the invocation timeout
    pub fn deadline_ticks(&self) -> Option<u64> {
        self.invocation_timeout_ms.map(|ms| {
            let tick = EPOCH_TICK.as_millis() as u64;
            ms.div_ceil(tick).max(1)
        })
    }
}

/// Background thread advancing the engine epoch
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    /// Start ticking `engine` every [`EPOCH_TICK`]
    pub fn start(engine: Engine) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("guest-epoch".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    thread::sleep(EPOCH_TICK);
                    engine.increment_epoch();
                }
            })
            .map_err(BridgeError::Io)?;

        debug!("Epoch ticker started ({:?} per tick)", EPOCH_TICK);

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = GuestLimits::default();
        assert_eq!(limits.memory_limit_mb, Some(256));
        assert!(limits.invocation_timeout_ms.is_none());
        assert!(limits.deadline_ticks().is_none());
    }

    #[test]
    fn test_unlimited() {
        let limits = GuestLimits::unlimited();
        assert!(limits.memory_limit_mb.is_none());
        assert!(limits.invocation_timeout_ms.is_none());
    }

    #[test]
    fn test_validation() {
        assert!(GuestLimits::default().validate().is_ok());
        assert!(GuestLimits::strict().validate().is_ok());

        let zero_memory = GuestLimits {
            memory_limit_mb: Some(0),
            ..Default::default()
        };
        assert!(zero_memory.validate().is_err());

        let huge_memory = GuestLimits {
            memory_limit_mb: Some(8192),
            ..Default::default()
        };
        assert!(huge_memory.validate().is_err());

        let zero_timeout = GuestLimits {
            invocation_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_deadline_ticks_round_up() {
        let limits = GuestLimits {
            invocation_timeout_ms: Some(25),
            ..Default::default()
        };
        assert_eq!(limits.deadline_ticks(), Some(3));

        let tiny = GuestLimits {
            invocation_timeout_ms: Some(1),
            ..Default::default()
        };
        assert_eq!(tiny.deadline_ticks(), Some(1));
    }

    #[test]
    fn test_ticker_stops_on_drop() {
        let mut config = wasmtime::Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).unwrap();

        let ticker = EpochTicker::start(engine).unwrap();
        thread::sleep(EPOCH_TICK * 3);
        drop(ticker);
    }
}
