//! Downlink RPC client — the host-side proxy for a worker's service.
//!
//! Each [`call`](RpcClient::call) invocation:
//! 1. Mints a fresh correlation id.
//! 2. Registers a oneshot in the pending table **before** sending, so a
//!    response that arrives immediately can never be missed.
//! 3. Sends the `CALL` frame over the downlink channel.
//! 4. Awaits the oneshot under the configured deadline; expiry removes the
//!    pending entry and rejects with a timeout.
//!
//! A single dispatcher installed on the channel routes `RESPONSE` / `ERROR`
//! / `TEARDOWN_COMPLETE` to the waiting futures and forwards `WORKER_READY`
//! to the engine. Channel loss rejects every outstanding call.
//!
//! The client implements [`Service`], which is what makes worker-backed
//! instances location-transparent: the engine registers the client itself as
//! the instance's service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;

use lattice_core::channel::{Channel, ChannelEnd};
use lattice_core::error::{RpcError, RpcResult, ServiceResult};
use lattice_core::protocol::Frame;
use lattice_core::service::Service;

use crate::pending::CallTable;

/// Hook invoked when the worker announces `WORKER_READY`, with the instance
/// id it carried.
pub type ReadyHook = Arc<dyn Fn(String) + Send + Sync>;

/// Hook invoked once when the downlink channel is lost.
pub type GoneHook = Arc<dyn Fn() + Send + Sync>;

/// Engine-supplied observers for worker lifecycle signals.
#[derive(Default, Clone)]
pub struct ClientEvents {
    /// Fired on `WORKER_READY`.
    pub on_ready: Option<ReadyHook>,
    /// Fired on channel loss, after outstanding calls were rejected.
    pub on_gone: Option<GoneHook>,
}

/// Host-side downlink client and service proxy.
pub struct RpcClient {
    channel: ChannelEnd,
    calls: Arc<CallTable>,
    call_timeout: Duration,
    gone: Arc<AtomicBool>,
}

impl RpcClient {
    /// Installs the dispatcher on `channel`, starts it, and returns the
    /// connected client.
    ///
    /// `call_timeout` bounds every method call issued through this client;
    /// teardown uses its own deadline (see [`teardown`](Self::teardown)).
    pub fn connect(channel: ChannelEnd, call_timeout: Duration, events: ClientEvents) -> Arc<Self> {
        let calls = Arc::new(CallTable::new());
        let gone = Arc::new(AtomicBool::new(false));

        let dispatch_calls = Arc::clone(&calls);
        let on_ready = events.on_ready.clone();
        channel.on_frame(Arc::new(move |frame| {
            let calls = Arc::clone(&dispatch_calls);
            let on_ready = on_ready.clone();
            Box::pin(async move {
                match frame {
                    Frame::Response { id, result } => {
                        calls.resolve(id, Ok(result));
                    }
                    Frame::Error { id, error } => {
                        calls.resolve(id, Err(RpcError::Remote(error)));
                    }
                    Frame::TeardownComplete { id, error } => {
                        let outcome = match error {
                            None => Ok(Value::Null),
                            Some(err) => Err(RpcError::Remote(err)),
                        };
                        calls.resolve(id, outcome);
                    }
                    Frame::WorkerReady { instance_id } => {
                        debug!(instance = %instance_id, "Worker is ready");
                        if let Some(hook) = on_ready {
                            hook(instance_id);
                        }
                    }
                    Frame::Unknown => {}
                    other => {
                        debug!(?other, "Unexpected frame kind on downlink client — ignored");
                    }
                }
            })
        }));

        let close_calls = Arc::clone(&calls);
        let close_gone = Arc::clone(&gone);
        let on_gone = events.on_gone.clone();
        channel.on_close(Arc::new(move || {
            close_gone.store(true, Ordering::SeqCst);
            close_calls.fail_all(RpcError::WorkerGone);
            if let Some(hook) = &on_gone {
                hook();
            }
        }));

        channel.start();

        Arc::new(Self {
            channel,
            calls,
            call_timeout,
            gone,
        })
    }

    /// Calls `method` on the worker's service.
    ///
    /// Calls issued before the worker is ready are queued by the channel and
    /// complete once the worker processes them.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        if self.gone.load(Ordering::SeqCst) {
            return Err(RpcError::WorkerGone);
        }

        let (id, rx) = self.calls.register();
        if let Err(e) = self.channel.send(Frame::Call {
            id,
            method: method.to_string(),
            args,
        }) {
            self.calls.remove(id);
            return Err(e.into());
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without a response — the table was torn down.
            Ok(Err(_)) => Err(RpcError::WorkerGone),
            Err(_) => {
                self.calls.remove(id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    ms: self.call_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Requests cooperative shutdown and awaits the acknowledgement.
    ///
    /// Returns `Ok(())` on a clean `TEARDOWN_COMPLETE`, the remote teardown
    /// error if the hook failed, and a timeout error when the worker does
    /// not answer within `deadline` — the caller escalates to forced
    /// termination in that case.
    pub async fn teardown(&self, deadline: Duration) -> RpcResult<()> {
        if self.gone.load(Ordering::SeqCst) {
            return Err(RpcError::WorkerGone);
        }

        let (id, rx) = self.calls.register();
        if let Err(e) = self.channel.send(Frame::Teardown { id }) {
            self.calls.remove(id);
            return Err(e.into());
        }

        match timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome.map(|_| ()),
            Ok(Err(_)) => Err(RpcError::WorkerGone),
            Err(_) => {
                self.calls.remove(id);
                Err(RpcError::Timeout {
                    method: "teardown".to_string(),
                    ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Whether the downlink has been lost.
    pub fn is_gone(&self) -> bool {
        self.gone.load(Ordering::SeqCst)
    }

    /// Number of calls currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.calls.len()
    }

    /// Closes the downlink channel end.
    pub fn close(&self) {
        self.channel.close();
    }
}

#[async_trait]
impl Service for RpcClient {
    async fn invoke(&self, method: &str, args: Vec<Value>) -> ServiceResult<Value> {
        Ok(self.call(method, args).await?)
    }
}
