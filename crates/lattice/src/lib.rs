//! # Lattice
//!
//! A deterministic plugin orchestration runtime.
//!
//! ## Overview
//!
//! Lattice represents a system as plugin *types* (config schema, requirement
//! contracts, lifecycle hooks) and plugin *instances* (configured nodes
//! wired to each other), computes a safe start/stop order over the wiring
//! graph, runs each instance either in process or in an isolated worker, and
//! makes inter-plugin calls location-transparent over a bidirectional
//! correlation-id protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────┐    ┌────────────────┐
//! │ Orchestrator │───▶│ Resolver  │    │ main instance  │──▶ service
//! │  (engine)    │    └───────────┘    └────────────────┘
//! │              │────────────────────▶┌────────────────┐
//! │   registry   │◀── uplink ─────────│ worker instance │──▶ proxy
//! └──────────────┘     downlink ─────▶└────────────────┘
//! ```
//!
//! - **Engine**: stores, resolver, lifecycle; starts instances in
//!   dependency order and tears them down in reverse.
//! - **Registry**: id → service map read by setups and uplink servers.
//! - **RPC**: `CALL`/`RESPONSE` downlink into workers, `UPLINK_CALL` back
//!   into dependencies, both with per-call deadlines.
//! - **Runtime**: config file, logging, and signal handling around the
//!   engine.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lattice::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let logger = PluginType::builder("logger")
//!         .setup(|_ctx, _cfg, _deps, _id| async {
//!             Ok(Some(
//!                 FnService::new()
//!                     .method("info", |args| async move {
//!                         println!("{}", args[0]);
//!                         Ok(serde_json::Value::Null)
//!                     })
//!                     .into_arc(),
//!             ))
//!         })
//!         .build();
//!
//!     let runtime = LatticeRuntime::new(ModuleRegistry::new());
//!     runtime.register_definition(logger)?;
//!     runtime.lock_definitions();
//!     runtime.register_plugin(PluginInstance::new("sys-logger", "logger"))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

// Core types (plugin model, protocol, capabilities)
pub use lattice_core::*;

// Engine, RPC, worker hosting, runtime
pub use lattice_engine;
pub use lattice_rpc;
pub use lattice_runtime;
pub use lattice_worker;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lattice::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use lattice_runtime::LatticeRuntime;

    // Engine surface
    pub use lattice_engine::{
        Orchestrator, StartOptions, StopOptions, WorkerState,
    };

    // Plugin model
    pub use lattice_core::plugin::{
        Deps, ExecutionMode, PluginInstance, PluginType, Wiring,
    };

    // Services and schemas
    pub use lattice_core::schema::{AnyValue, MethodSet, RequiredKeys};
    pub use lattice_core::service::{FnService, Service, ServiceArc};

    // Worker hosting
    pub use lattice_worker::ModuleRegistry;
}
