//! # Lattice RPC
//!
//! The correlation-id request/response protocol that makes inter-plugin
//! calls location-transparent.
//!
//! Two independent channels connect the host to every worker:
//!
//! - **Downlink** (host → worker): method calls into the worker's service.
//!   [`RpcClient`] is the host-side proxy (it implements `Service`, so the
//!   engine registers it directly); [`server::install`] is the worker-side
//!   dispatcher.
//! - **Uplink** (worker → host): the worker calling back into its declared
//!   dependencies. [`UplinkClient`] + per-requirement [`DepHandle`] stubs on
//!   the worker side; [`UplinkServer`] resolving requirement names through
//!   the wiring on the host side.
//!
//! Every outstanding request lives in a [`CallTable`] until its response,
//! timeout, or channel loss — whichever comes first.

pub mod client;
pub mod pending;
pub mod server;
pub mod uplink;

pub use client::{ClientEvents, GoneHook, ReadyHook, RpcClient};
pub use pending::{CallOutcome, CallTable};
pub use uplink::{DepHandle, UplinkClient, UplinkServer};

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::channel::{Channel, memory_pair};
    use lattice_core::error::RpcError;
    use lattice_core::plugin::TeardownFn;
    use lattice_core::service::{FnService, Service};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn echo_service() -> lattice_core::service::ServiceArc {
        FnService::new()
            .method("echo", |args| async move { Ok(args[0].clone()) })
            .method("fail", |_| async {
                Err(lattice_core::error::ServiceError::Failed(
                    "boom".to_string(),
                ))
            })
            .into_arc()
    }

    #[tokio::test]
    async fn call_round_trips_through_server() {
        let (host_end, worker_end) = memory_pair();
        server::install(worker_end, echo_service(), None, "db".into());
        let client = RpcClient::connect(host_end, Duration::from_secs(1), ClientEvents::default());

        let out = client.call("echo", vec![json!("hi")]).await.unwrap();
        assert_eq!(out, json!("hi"));
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn remote_failure_is_reconstructed() {
        let (host_end, worker_end) = memory_pair();
        server::install(worker_end, echo_service(), None, "db".into());
        let client = RpcClient::connect(host_end, Duration::from_secs(1), ClientEvents::default());

        let err = client.call("fail", vec![]).await.unwrap_err();
        match err {
            RpcError::Remote(wire) => {
                assert_eq!(wire.name, "ServiceError");
                assert!(wire.message.contains("boom"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_method_becomes_remote_error() {
        let (host_end, worker_end) = memory_pair();
        server::install(worker_end, echo_service(), None, "db".into());
        let client = RpcClient::connect(host_end, Duration::from_secs(1), ClientEvents::default());

        let err = client.call("missing", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote(wire) if wire.name == "UnknownMethod"));
    }

    #[tokio::test]
    async fn call_times_out_and_clears_pending_entry() {
        // No server on the peer end: the call can never be answered.
        let (host_end, worker_end) = memory_pair();
        worker_end.on_frame(Arc::new(|_| Box::pin(async {})));
        worker_end.start();
        let client =
            RpcClient::connect(host_end, Duration::from_millis(50), ClientEvents::default());

        let err = client.call("echo", vec![json!(1)]).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { ref method, ms: 50 } if method == "echo"));
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn calls_issued_before_server_install_complete_later() {
        let (host_end, worker_end) = memory_pair();
        let client = RpcClient::connect(host_end, Duration::from_secs(1), ClientEvents::default());

        let pending = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("echo", vec![json!("early")]).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        server::install(worker_end, echo_service(), None, "db".into());

        assert_eq!(pending.await.unwrap().unwrap(), json!("early"));
    }

    #[tokio::test]
    async fn channel_loss_rejects_outstanding_calls() {
        let (host_end, worker_end) = memory_pair();
        worker_end.on_frame(Arc::new(|_| Box::pin(async {})));
        worker_end.start();
        let client = RpcClient::connect(host_end, Duration::from_secs(5), ClientEvents::default());

        let pending = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("echo", vec![]).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker_end.close();

        assert!(matches!(
            pending.await.unwrap().unwrap_err(),
            RpcError::WorkerGone
        ));
        assert!(client.is_gone());
        assert!(matches!(
            client.call("echo", vec![]).await.unwrap_err(),
            RpcError::WorkerGone
        ));
    }

    #[tokio::test]
    async fn teardown_runs_hook_and_acknowledges() {
        let (host_end, worker_end) = memory_pair();
        let ran = Arc::new(AtomicUsize::new(0));
        let hook_ran = Arc::clone(&ran);
        let teardown: TeardownFn = Arc::new(move |_id| {
            let ran = Arc::clone(&hook_ran);
            Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });
        server::install(worker_end, echo_service(), Some(teardown), "db".into());
        let client = RpcClient::connect(host_end, Duration::from_secs(1), ClientEvents::default());

        client.teardown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn teardown_times_out_when_hook_stalls() {
        let (host_end, worker_end) = memory_pair();
        let teardown: TeardownFn = Arc::new(|_id| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
        });
        server::install(worker_end, echo_service(), Some(teardown), "db".into());
        let client = RpcClient::connect(host_end, Duration::from_secs(1), ClientEvents::default());

        let err = client.teardown(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { ms: 50, .. }));
    }

    #[tokio::test]
    async fn worker_ready_reaches_the_hook_exactly_once() {
        let (host_end, worker_end) = memory_pair();
        let seen = Arc::new(AtomicUsize::new(0));
        let hook_seen = Arc::clone(&seen);
        let events = ClientEvents {
            on_ready: Some(Arc::new(move |instance| {
                assert_eq!(instance, "db");
                hook_seen.fetch_add(1, Ordering::SeqCst);
            })),
            on_gone: None,
        };
        let _client = RpcClient::connect(host_end, Duration::from_secs(1), events);

        worker_end
            .send(lattice_core::protocol::Frame::WorkerReady {
                instance_id: "db".into(),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_is_a_service() {
        let (host_end, worker_end) = memory_pair();
        server::install(worker_end, echo_service(), None, "db".into());
        let client = RpcClient::connect(host_end, Duration::from_secs(1), ClientEvents::default());

        let service: lattice_core::service::ServiceArc = client;
        let out = service.invoke("echo", vec![json!(7)]).await.unwrap();
        assert_eq!(out, json!(7));
    }
}
