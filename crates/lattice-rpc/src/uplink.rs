//! Uplink protocol — workers calling back into their declared dependencies.
//!
//! The uplink is a second duplex channel per worker, independent of the
//! downlink and with its own correlation-id space:
//!
//! - The worker side holds an [`UplinkClient`] and hands its setup hook one
//!   [`DepHandle`] per declared requirement. A handle is a [`Service`] whose
//!   every invocation becomes an `UPLINK_CALL { serviceName, method, args }`,
//!   following the same pending/timeout discipline as the downlink.
//! - The host side attaches an [`UplinkServer`] parameterized by the service
//!   registry and a snapshot of the owning instance's wiring. `serviceName`
//!   is a *requirement name*, resolved `wiring[name] → instance id →
//!   registry`; the server holds no other state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;

use lattice_core::channel::{Channel, ChannelEnd};
use lattice_core::error::{RpcError, RpcResult, ServiceResult};
use lattice_core::plugin::{Deps, Requirements, Wiring};
use lattice_core::protocol::{Frame, WireError};
use lattice_core::service::{Service, ServiceLookup};

use crate::pending::CallTable;

// =============================================================================
// Worker side: UplinkClient + DepHandle
// =============================================================================

/// Worker-side uplink endpoint.
pub struct UplinkClient {
    channel: ChannelEnd,
    calls: Arc<CallTable>,
    call_timeout: Duration,
}

impl UplinkClient {
    /// Installs the response dispatcher on `channel`, starts it, and returns
    /// the connected client.
    pub fn connect(channel: ChannelEnd, call_timeout: Duration) -> Arc<Self> {
        let calls = Arc::new(CallTable::new());

        let dispatch_calls = Arc::clone(&calls);
        channel.on_frame(Arc::new(move |frame| {
            let calls = Arc::clone(&dispatch_calls);
            Box::pin(async move {
                match frame {
                    Frame::UplinkResponse { id, result } => {
                        calls.resolve(id, Ok(result));
                    }
                    Frame::UplinkError { id, error } => {
                        calls.resolve(id, Err(RpcError::Remote(error)));
                    }
                    Frame::Unknown => {}
                    other => {
                        debug!(?other, "Unexpected frame kind on uplink client — ignored");
                    }
                }
            })
        }));

        let close_calls = Arc::clone(&calls);
        channel.on_close(Arc::new(move || {
            close_calls.fail_all(RpcError::WorkerGone);
        }));

        channel.start();

        Arc::new(Self {
            channel,
            calls,
            call_timeout,
        })
    }

    /// Issues one dependency call through the uplink.
    pub async fn call(
        &self,
        service_name: &str,
        method: &str,
        args: Vec<Value>,
    ) -> RpcResult<Value> {
        let (id, rx) = self.calls.register();
        if let Err(e) = self.channel.send(Frame::UplinkCall {
            id,
            service_name: service_name.to_string(),
            method: method.to_string(),
            args,
        }) {
            self.calls.remove(id);
            return Err(e.into());
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::WorkerGone),
            Err(_) => {
                self.calls.remove(id);
                Err(RpcError::Timeout {
                    method: format!("{service_name}.{method}"),
                    ms: self.call_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Builds the [`Deps`] handed to a worker's setup hook: one
    /// uplink-backed stub per declared requirement.
    pub fn deps_for(self: &Arc<Self>, requirements: &Requirements) -> Deps {
        let mut deps = Deps::new();
        for name in requirements.names() {
            deps.insert(
                name,
                Arc::new(DepHandle {
                    uplink: Arc::clone(self),
                    requirement: name.to_string(),
                }) as Arc<dyn Service>,
            );
        }
        deps
    }
}

/// Per-requirement dependency stub. Forwards every method invocation to the
/// uplink under its requirement name.
pub struct DepHandle {
    uplink: Arc<UplinkClient>,
    requirement: String,
}

#[async_trait]
impl Service for DepHandle {
    async fn invoke(&self, method: &str, args: Vec<Value>) -> ServiceResult<Value> {
        Ok(self.uplink.call(&self.requirement, method, args).await?)
    }
}

// =============================================================================
// Host side: UplinkServer
// =============================================================================

/// Host-side uplink dispatcher for exactly one worker.
///
/// Stateless beyond the wiring snapshot taken at spawn; the registry is only
/// read.
pub struct UplinkServer {
    registry: Arc<dyn ServiceLookup>,
    wiring: Wiring,
}

impl UplinkServer {
    /// Creates a server resolving requirement names through `wiring` and
    /// service ids through `registry`.
    pub fn new(registry: Arc<dyn ServiceLookup>, wiring: Wiring) -> Self {
        Self { registry, wiring }
    }

    /// Installs the dispatcher on the host end of the uplink channel and
    /// starts it.
    pub fn attach(self, channel: ChannelEnd) {
        let server = Arc::new(self);
        let reply_channel = Arc::clone(&channel);
        channel.on_frame(Arc::new(move |frame| {
            let server = Arc::clone(&server);
            let channel = Arc::clone(&reply_channel);
            Box::pin(async move {
                match frame {
                    Frame::UplinkCall {
                        id,
                        service_name,
                        method,
                        args,
                    } => {
                        let reply = match server.dispatch(&service_name, &method, args).await {
                            Ok(result) => Frame::UplinkResponse { id, result },
                            Err(error) => Frame::UplinkError { id, error },
                        };
                        if channel.send(reply).is_err() {
                            debug!(id, "Uplink closed before reply could be sent");
                        }
                    }
                    Frame::Unknown => {}
                    other => {
                        debug!(?other, "Unexpected frame kind on uplink server — ignored");
                    }
                }
            })
        }));
        channel.start();
    }

    async fn dispatch(
        &self,
        service_name: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, WireError> {
        let Some(target) = self.wiring.get(service_name) else {
            return Err(WireError::new(
                "WiringMissing",
                format!("Wiring missing for {service_name}"),
            ));
        };
        let service = self
            .registry
            .lookup(target)
            .map_err(|e| WireError::new("UnknownService", e.to_string()))?;
        service
            .invoke(method, args)
            .await
            .map_err(|e| e.to_wire())
    }
}
