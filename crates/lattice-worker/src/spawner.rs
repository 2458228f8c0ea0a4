//! In-process worker spawner.
//!
//! [`TaskSpawner`] hosts each worker on its own tokio task, connected to the
//! engine over in-memory channel pairs. Entry points are resolved against a
//! [`ModuleRegistry`] *before* the task is created, so a dangling entry
//! point or an unknown type id fails the spawn synchronously — the failure
//! policy the engine relies on to abort startup.
//!
//! Forced termination aborts the worker task and closes its downlink end;
//! frame delivery stops immediately, though method bodies already in flight
//! run out in the background (the in-process analog of an orphaned thread).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use lattice_core::channel::{Channel, ChannelEnd, memory_pair};
use lattice_core::spawn::{SpawnError, Spawner, WorkerBundle, WorkerHandle};

use crate::host;
use crate::modules::ModuleRegistry;

/// Default deadline for dependency calls issued from inside a worker.
const DEFAULT_UPLINK_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Spawns workers as tokio tasks resolving entry points from a
/// [`ModuleRegistry`].
pub struct TaskSpawner {
    modules: ModuleRegistry,
    uplink_timeout: Duration,
}

impl TaskSpawner {
    /// Creates a spawner over the given module table.
    pub fn new(modules: ModuleRegistry) -> Self {
        Self {
            modules,
            uplink_timeout: DEFAULT_UPLINK_TIMEOUT,
        }
    }

    /// Sets the deadline for workers' uplink dependency calls.
    pub fn with_uplink_timeout(mut self, timeout: Duration) -> Self {
        self.uplink_timeout = timeout;
        self
    }

    /// Wraps the spawner into the handle the engine takes.
    pub fn into_arc(self) -> Arc<dyn Spawner> {
        Arc::new(self)
    }
}

impl Spawner for TaskSpawner {
    fn channel_pair(&self) -> (ChannelEnd, ChannelEnd) {
        memory_pair()
    }

    fn spawn(
        &self,
        bundle: WorkerBundle,
        downlink: ChannelEnd,
    ) -> Result<Box<dyn WorkerHandle>, SpawnError> {
        let exports = self.modules.resolve(&bundle.entry_point).ok_or_else(|| {
            SpawnError(format!("entry point '{}' not found", bundle.entry_point))
        })?;
        let plugin_type = exports
            .iter()
            .find(|t| t.id() == bundle.type_id)
            .cloned()
            .ok_or_else(|| {
                SpawnError(format!(
                    "entry point '{}' exports no type '{}'",
                    bundle.entry_point, bundle.type_id
                ))
            })?;

        debug!(
            instance = %bundle.instance_id,
            entry_point = %bundle.entry_point,
            "Spawning worker task"
        );
        let task_downlink = Arc::clone(&downlink);
        let uplink_timeout = self.uplink_timeout;
        let join = tokio::spawn(async move {
            host::run_worker(plugin_type, bundle, task_downlink, uplink_timeout).await;
        });

        Ok(Box::new(TaskWorkerHandle { join, downlink }))
    }
}

/// Handle to a task-hosted worker.
struct TaskWorkerHandle {
    join: JoinHandle<()>,
    downlink: ChannelEnd,
}

impl WorkerHandle for TaskWorkerHandle {
    fn terminate(&self) {
        self.join.abort();
        self.downlink.close();
    }
}
