//! The worker host — what runs inside an isolated worker.
//!
//! Bootstrap sequence, mirroring the engine's expectations:
//!
//! 1. Connect the uplink client on the bundle's channel end and build one
//!    dependency stub per requirement the plugin type declares.
//! 2. Invoke the type's setup with a mock context: `register_service`
//!    captures the single service value; `get_service` fails fast because
//!    workers have no local registry.
//! 3. Record the captured or returned service (a captured one wins), fall
//!    back to a [`NullService`] when setup exposed nothing.
//! 4. Install the downlink server on the primary channel and emit
//!    `WORKER_READY`.
//!
//! A setup failure closes the downlink without announcing readiness; the
//! host observes the loss as a worker crash.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

use lattice_core::channel::{Channel, ChannelEnd};
use lattice_core::error::{RegistryError, RegistryResult};
use lattice_core::plugin::{PluginType, SetupContext};
use lattice_core::protocol::Frame;
use lattice_core::service::{NullService, ServiceArc};
use lattice_core::spawn::WorkerBundle;
use lattice_rpc::{UplinkClient, server};

// =============================================================================
// MockContext
// =============================================================================

/// The setup context inside a worker.
///
/// Captures at most one service value; a second registration replaces the
/// first. Lookups fail fast — dependencies come through the uplink, never a
/// local registry.
#[derive(Default)]
pub struct MockContext {
    captured: Mutex<Option<ServiceArc>>,
}

impl MockContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the captured service value, if any.
    pub fn take_captured(&self) -> Option<ServiceArc> {
        self.captured.lock().take()
    }
}

impl SetupContext for MockContext {
    fn register_service(&self, _instance_id: &str, service: ServiceArc) -> RegistryResult<()> {
        *self.captured.lock() = Some(service);
        Ok(())
    }

    fn get_service(&self, instance_id: &str) -> RegistryResult<ServiceArc> {
        Err(RegistryError::UnknownService(format!(
            "{instance_id} (workers have no local registry)"
        )))
    }

    fn has_service(&self, _instance_id: &str) -> bool {
        false
    }
}

// =============================================================================
// Worker main
// =============================================================================

/// Runs one worker to readiness.
///
/// `plugin_type` is the entry-point export matching the bundle's `type_id`;
/// `downlink` is the worker end of the primary channel. `uplink_timeout`
/// bounds every dependency call the setup (and later the service) issues.
pub async fn run_worker(
    plugin_type: PluginType,
    bundle: WorkerBundle,
    downlink: ChannelEnd,
    uplink_timeout: Duration,
) {
    let WorkerBundle {
        instance_id,
        config,
        uplink,
        ..
    } = bundle;

    let uplink = UplinkClient::connect(uplink, uplink_timeout);
    let deps = uplink.deps_for(plugin_type.requirements());

    let ctx = Arc::new(MockContext::new());
    debug!(instance = %instance_id, "Worker setup starting");
    let returned = (plugin_type.setup())(
        Arc::clone(&ctx) as Arc<dyn SetupContext>,
        config,
        deps,
        instance_id.clone(),
    )
    .await;

    match returned {
        Ok(returned) => {
            // A context registration wins over the returned value.
            let service = ctx
                .take_captured()
                .or(returned)
                .unwrap_or_else(|| Arc::new(NullService));
            server::install(
                Arc::clone(&downlink),
                service,
                plugin_type.teardown().cloned(),
                instance_id.clone(),
            );
            let _ = downlink.send(Frame::WorkerReady { instance_id });
        }
        Err(e) => {
            error!(instance = %instance_id, error = %e, "Worker setup failed");
            downlink.close();
        }
    }
}
