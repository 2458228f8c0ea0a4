//! The [`Spawner`] capability — launching isolated workers.
//!
//! The engine never knows how workers are hosted (tokio tasks, subprocesses,
//! OS threads); it asks a `Spawner` for channel pairs and worker launches and
//! holds the returned [`WorkerHandle`] for forced termination.

use serde_json::Value;

use crate::channel::ChannelEnd;

/// The parameter bundle handed to a worker host at spawn.
///
/// Ownership of `uplink` transfers to the worker; the engine keeps only the
/// host end of the uplink pair.
pub struct WorkerBundle {
    /// The instance the worker will host.
    pub instance_id: String,
    /// The plugin type to locate at the entry point.
    pub type_id: String,
    /// Locator the worker host resolves to the type's setup code.
    pub entry_point: String,
    /// Schema-validated config for the instance.
    pub config: Value,
    /// Worker end of the uplink channel (worker → host dependency calls).
    pub uplink: ChannelEnd,
}

/// Handle to a live worker, owned by the engine's worker record.
pub trait WorkerHandle: Send + Sync {
    /// Forcibly terminates the worker. Idempotent and synchronous; used on
    /// teardown timeout and from the engine's drop guard.
    fn terminate(&self);
}

impl std::fmt::Debug for dyn WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn WorkerHandle").finish_non_exhaustive()
    }
}

/// Errors a spawner can report. Spawn failures are fatal to startup.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SpawnError(pub String);

/// Launches worker hosts and mints the channels that connect them.
pub trait Spawner: Send + Sync {
    /// Creates a connected duplex channel pair.
    fn channel_pair(&self) -> (ChannelEnd, ChannelEnd);

    /// Launches a worker host with `bundle`, attaching `downlink` as the
    /// worker end of the primary (host → worker) channel.
    fn spawn(
        &self,
        bundle: WorkerBundle,
        downlink: ChannelEnd,
    ) -> Result<Box<dyn WorkerHandle>, SpawnError>;
}
