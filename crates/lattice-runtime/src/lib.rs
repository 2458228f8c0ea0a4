//! # Lattice Runtime
//!
//! Runtime orchestration layer for the Lattice orchestration runtime:
//! configuration loading (`lattice.yaml` with environment-variable
//! expansion), logging setup, and the [`LatticeRuntime`] facade driving the
//! engine from start to signal-triggered shutdown.

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LatticeConfig, load_config};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::LatticeRuntime;
