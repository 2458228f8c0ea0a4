//! # Lattice Engine
//!
//! Registry, graph resolver, and lifecycle engine for the Lattice
//! orchestration runtime.
//!
//! The [`Orchestrator`] is the programmatic surface: register plugin types
//! and instances, lock the type store, then drive `start()`/`stop()`. It
//! composes four collaborators, leaves first:
//!
//! - [`ServiceRegistry`] — id → service map with optional contract
//!   validation.
//! - [`DefinitionStore`] / [`InstanceStore`] — identity and lock state.
//! - [`resolver`] — deterministic cycle-detecting topological ordering.
//! - The lifecycle engine itself, which starts instances in order, spawns
//!   workers, and installs the RPC endpoints around them.

pub mod diagram;
pub mod engine;
pub mod registry;
pub mod resolver;
pub mod store;

pub use engine::{
    DEFAULT_RPC_TIMEOUT, DEFAULT_TEARDOWN_TIMEOUT, EngineStats, Orchestrator, StartOptions,
    StartReport, StopOptions, StopReport, WorkerState,
};
pub use registry::ServiceRegistry;
pub use resolver::resolve_order;
pub use store::{DefinitionStore, InstanceStore};
