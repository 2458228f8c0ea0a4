//! The [`Service`] trait — the runtime value an instance exposes to consumers.
//!
//! Every service is a trait object invoked **by method name** with JSON
//! arguments. A real implementation dispatches on the name against its own
//! methods; a worker-backed proxy encodes the call into a `CALL` frame and
//! lets the remote side dispatch. Consumers cannot tell the two apart, which
//! is what makes execution mode a per-instance deployment choice.
//!
//! # Implementing a service
//!
//! ```rust,ignore
//! struct Greeter;
//!
//! #[async_trait]
//! impl Service for Greeter {
//!     async fn invoke(&self, method: &str, args: Vec<Value>) -> ServiceResult<Value> {
//!         match method {
//!             "greet" => Ok(json!(format!("hello {}", args[0].as_str().unwrap_or("?")))),
//!             other => Err(ServiceError::UnknownMethod(other.to_string())),
//!         }
//!     }
//!
//!     fn methods(&self) -> Vec<String> {
//!         vec!["greet".into()]
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};

/// A dynamically invocable service value.
///
/// # Concurrency
///
/// Services are shared as `Arc<dyn Service>` across the engine control task
/// and uplink dispatch tasks; implementations must use interior mutability
/// for any state that changes across calls.
#[async_trait]
pub trait Service: Send + Sync {
    /// Invokes `method` with positional `args`, returning its result.
    ///
    /// Unknown names must fail with [`ServiceError::UnknownMethod`]; method
    /// names are not filtered anywhere else in the runtime.
    async fn invoke(&self, method: &str, args: Vec<Value>) -> ServiceResult<Value>;

    /// The method names this service exposes, when it can enumerate them.
    ///
    /// Used only by contracts that introspect shapes. Proxies cannot
    /// enumerate their remote methods and return the default empty list.
    fn methods(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared handle to a service value.
pub type ServiceArc = Arc<dyn Service>;

impl std::fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Service").finish_non_exhaustive()
    }
}

/// Read-only lookup of published services by instance id.
///
/// Implemented by the engine's service registry; the uplink server is
/// written against this capability so the protocol layer never depends on
/// the engine.
pub trait ServiceLookup: Send + Sync {
    /// Fetches the service published under `instance_id`.
    fn lookup(&self, instance_id: &str) -> crate::error::RegistryResult<ServiceArc>;
}

// =============================================================================
// FnService — closure-backed service
// =============================================================================

/// Async handler for one method of a [`FnService`].
pub type MethodFn = Arc<
    dyn Fn(Vec<Value>) -> futures::future::BoxFuture<'static, ServiceResult<Value>> + Send + Sync,
>;

/// A [`Service`] assembled from named async closures.
///
/// The common way to build small services in tests and in `main`-mode
/// plugins that don't warrant a dedicated type.
///
/// ```rust,ignore
/// let svc = FnService::new()
///     .method("ping", |_args| async { Ok(json!("pong")) });
/// ```
#[derive(Default)]
pub struct FnService {
    methods: HashMap<String, MethodFn>,
}

impl FnService {
    /// Creates an empty service with no methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method handler under `name`.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ServiceResult<Value>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |args| Box::pin(handler(args))));
        self
    }

    /// Wraps the service into a shareable handle.
    pub fn into_arc(self) -> ServiceArc {
        Arc::new(self)
    }
}

#[async_trait]
impl Service for FnService {
    async fn invoke(&self, method: &str, args: Vec<Value>) -> ServiceResult<Value> {
        let handler = self
            .methods
            .get(method)
            .ok_or_else(|| ServiceError::UnknownMethod(method.to_string()))?;
        handler(args).await
    }

    fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

// =============================================================================
// NullService — placeholder for setups that expose nothing
// =============================================================================

/// A [`Service`] that rejects every invocation.
///
/// Installed for workers whose setup neither registered nor returned a
/// service value, so incoming `CALL` frames still receive a well-formed
/// `ERROR` reply instead of hanging.
pub struct NullService;

#[async_trait]
impl Service for NullService {
    async fn invoke(&self, method: &str, _args: Vec<Value>) -> ServiceResult<Value> {
        Err(ServiceError::UnknownMethod(method.to_string()))
    }
}
