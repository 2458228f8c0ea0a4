//! # Lattice Worker
//!
//! Worker hosting for the Lattice orchestration runtime: the
//! [`ModuleRegistry`] resolving entry points to plugin types, the worker
//! host bootstrap ([`host::run_worker`]), and the in-process
//! [`TaskSpawner`] that hosts each worker on its own tokio task.
//!
//! Any other hosting strategy (subprocesses, OS threads) plugs into the
//! engine by implementing `lattice_core::Spawner`; this crate provides the
//! stock implementation and the host logic a custom spawner would reuse.

pub mod host;
pub mod modules;
pub mod spawner;

pub use host::{MockContext, run_worker};
pub use modules::ModuleRegistry;
pub use spawner::TaskSpawner;
