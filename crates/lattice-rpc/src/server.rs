//! Downlink RPC server — the worker-side dispatcher for incoming calls.
//!
//! On `CALL` the server invokes the hosted service by method name (names are
//! not filtered; the worker implementer is trusted) and answers `RESPONSE`
//! or `ERROR`. On `TEARDOWN` it runs the user teardown hook, if any, then
//! answers `TEARDOWN_COMPLETE`, carrying the hook's error when it failed.
//!
//! Each frame is handled on its own task, so a slow method call does not
//! block teardown or other calls.

use std::sync::Arc;

use tracing::{debug, warn};

use lattice_core::channel::{Channel, ChannelEnd};
use lattice_core::plugin::TeardownFn;
use lattice_core::protocol::{Frame, WireError};
use lattice_core::service::{Service, ServiceArc};

/// Installs the downlink dispatcher for a worker's service and starts the
/// channel.
///
/// Called by the worker host once setup has produced the service value;
/// frames queued since spawn are delivered as soon as the channel starts.
pub fn install(
    channel: ChannelEnd,
    service: ServiceArc,
    teardown: Option<TeardownFn>,
    instance_id: String,
) {
    let reply_channel = Arc::clone(&channel);
    channel.on_frame(Arc::new(move |frame| {
        let channel = Arc::clone(&reply_channel);
        let service = Arc::clone(&service);
        let teardown = teardown.clone();
        let instance_id = instance_id.clone();
        Box::pin(async move {
            match frame {
                Frame::Call { id, method, args } => {
                    let reply = match service.invoke(&method, args).await {
                        Ok(result) => Frame::Response { id, result },
                        Err(err) => Frame::Error {
                            id,
                            error: err.to_wire(),
                        },
                    };
                    if channel.send(reply).is_err() {
                        warn!(instance = %instance_id, id, "Downlink closed before reply could be sent");
                    }
                }
                Frame::Teardown { id } => {
                    let error = match &teardown {
                        Some(hook) => hook(instance_id.clone())
                            .await
                            .err()
                            .map(|e| WireError::new("TeardownError", e.to_string())),
                        None => None,
                    };
                    if channel.send(Frame::TeardownComplete { id, error }).is_err() {
                        warn!(instance = %instance_id, id, "Downlink closed before teardown acknowledgement");
                    }
                }
                Frame::Unknown => {}
                other => {
                    debug!(?other, "Unexpected frame kind on downlink server — ignored");
                }
            }
        })
    }));
    channel.start();
}
