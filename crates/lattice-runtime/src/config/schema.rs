//! Configuration schema.

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration, usually loaded from `lattice.yaml`.
///
/// Every section and field is optional; absent values take the documented
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatticeConfig {
    /// Global settings.
    #[serde(default)]
    pub global: GlobalConfig,
    /// Engine timeouts.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Global runtime settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Engine timeout knobs, both per-engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Deadline for every downlink/uplink method call, in milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Deadline for a worker's cooperative teardown, in milliseconds.
    #[serde(default = "default_teardown_timeout_ms")]
    pub teardown_timeout_ms: u64,
}

impl EngineConfig {
    /// RPC deadline as a [`Duration`].
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Teardown deadline as a [`Duration`].
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: default_rpc_timeout_ms(),
            teardown_timeout_ms: default_teardown_timeout_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_teardown_timeout_ms() -> u64 {
    5_000
}
