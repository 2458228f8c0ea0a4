//! Unified error types for the Lattice core.
//!
//! This module provides standardized error types used across core components.
//! Config-file errors live in `lattice-runtime`; everything the engine, the
//! RPC layer, and workers can raise is defined here.

use thiserror::Error;

use crate::protocol::WireError;

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised at registration or lookup time by the definition store,
/// the instance store, and the service registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The definition store has been locked; no further types may register.
    #[error("definition store is locked")]
    Locked,

    /// A plugin type with this id is already registered.
    #[error("plugin type '{0}' is already registered")]
    DuplicateType(String),

    /// A plugin instance with this id is already registered.
    #[error("plugin instance '{0}' is already registered")]
    DuplicateInstance(String),

    /// An instance references a type id that does not exist.
    #[error("instance '{instance}' references unknown type '{type_id}'")]
    UnknownType {
        /// The instance carrying the dangling reference.
        instance: String,
        /// The missing type id.
        type_id: String,
    },

    /// A service with this id is already present in the registry.
    #[error("service '{0}' is already registered")]
    DuplicateService(String),

    /// No service is registered under this id.
    #[error("service '{0}' not found")]
    UnknownService(String),

    /// A service value failed its contract check at registration.
    #[error("service '{id}' violates its contract: {reason}")]
    ContractViolation {
        /// The offending service id.
        id: String,
        /// What the contract rejected.
        reason: String,
    },

    /// Instance registration was attempted after `start()` began.
    #[error("instances are sealed once start() has begun")]
    InstancesSealed,
}

// =============================================================================
// Graph Errors
// =============================================================================

/// Defects in the instance wiring graph, detected by the resolver or while
/// materializing dependencies.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// The wiring graph contains a cycle. The path lists every node of the
    /// cycle in traversal order, e.g. `x -> y -> x`.
    #[error("cyclic dependency: {path}")]
    CyclicDependency {
        /// Full ancestor path of the cycle, `a0 -> a1 -> … -> a0`.
        path: String,
    },

    /// An instance's wiring is missing an entry its type requires.
    #[error("instance '{instance}' has no wiring for requirement '{requirement}'")]
    WiringMissing {
        /// The instance with the incomplete wiring.
        instance: String,
        /// The declared requirement name that is unwired.
        requirement: String,
    },

    /// A wiring mapping received the same requirement name twice.
    #[error("duplicate wiring entry '{requirement}'")]
    DuplicateWiring {
        /// The repeated requirement name.
        requirement: String,
    },

    /// A requirements mapping received the same name twice.
    #[error("duplicate requirement '{requirement}'")]
    DuplicateRequirement {
        /// The repeated requirement name.
        requirement: String,
    },
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors produced by [`ConfigSchema::parse`](crate::schema::ConfigSchema) and
/// [`ServiceContract::validate`](crate::schema::ServiceContract).
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// The value does not match the schema.
    #[error("{0}")]
    Invalid(String),

    /// A required key is absent.
    #[error("missing required key '{0}'")]
    MissingKey(String),

    /// The service does not expose a method the contract demands.
    #[error("service is missing method '{0}'")]
    MissingMethod(String),
}

// =============================================================================
// Channel Errors
// =============================================================================

/// Errors raised by a [`Channel`](crate::channel::Channel) endpoint.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The peer end is gone; the frame was not delivered.
    #[error("channel is closed")]
    Closed,

    /// The frame could not be handed to the transport.
    #[error("failed to send frame: {0}")]
    SendFailed(String),
}

// =============================================================================
// RPC Errors
// =============================================================================

/// Errors surfaced by downlink and uplink calls.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// No response arrived within the call deadline.
    #[error("call to '{method}' timed out after {ms}ms")]
    Timeout {
        /// The method whose call expired.
        method: String,
        /// The configured deadline in milliseconds.
        ms: u64,
    },

    /// The remote side answered with an error; `{name, message, stack}` are
    /// reconstructed faithfully.
    #[error("remote error {}: {}", .0.name, .0.message)]
    Remote(WireError),

    /// The worker backing this call is gone (crash or forced termination).
    #[error("worker is gone")]
    WorkerGone,

    /// The underlying channel rejected the frame.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

// =============================================================================
// Service Errors
// =============================================================================

/// Errors produced when invoking a [`Service`](crate::service::Service).
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service has no method with this name.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// The arguments do not fit the method.
    #[error("bad arguments for '{method}': {reason}")]
    BadArguments {
        /// The method that rejected its arguments.
        method: String,
        /// Why the arguments were rejected.
        reason: String,
    },

    /// The method ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The call crossed a channel and failed there.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl ServiceError {
    /// Converts this error into its wire representation, preserving the
    /// `{name, message}` pair the protocol carries.
    pub fn to_wire(&self) -> WireError {
        match self {
            ServiceError::Rpc(RpcError::Remote(wire)) => wire.clone(),
            ServiceError::UnknownMethod(_) => WireError::new("UnknownMethod", self.to_string()),
            ServiceError::BadArguments { .. } => WireError::new("BadArguments", self.to_string()),
            ServiceError::Failed(_) => WireError::new("ServiceError", self.to_string()),
            ServiceError::Rpc(e) => WireError::new("RpcError", e.to_string()),
        }
    }
}

impl From<WireError> for ServiceError {
    fn from(err: WireError) -> Self {
        ServiceError::Rpc(RpcError::Remote(err))
    }
}

// =============================================================================
// Lifecycle Errors
// =============================================================================

/// Fatal errors during `start()`. Any of these aborts startup; instances
/// started so far are torn down in reverse before the error is returned.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// An instance's config failed its type's schema.
    #[error("invalid config for instance '{instance}': {source}")]
    ConfigInvalid {
        /// The instance whose config was rejected.
        instance: String,
        /// The schema failure.
        source: SchemaError,
    },

    /// A structural registration/lookup defect.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A wiring or cycle defect.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The instance's setup hook returned an error.
    #[error("setup of instance '{instance}' failed: {reason}")]
    SetupFailed {
        /// The instance whose setup failed.
        instance: String,
        /// The error the hook reported.
        reason: String,
    },

    /// The worker for this instance could not be spawned.
    #[error("failed to spawn worker for instance '{instance}': {reason}")]
    WorkerSpawnFailed {
        /// The instance whose worker did not come up.
        instance: String,
        /// What went wrong at spawn.
        reason: String,
    },

    /// A worker did not acknowledge `TEARDOWN` within the deadline.
    ///
    /// Never escapes `stop()`; recorded for logging and stats only.
    #[error("worker '{instance}' exceeded the teardown deadline of {ms}ms")]
    TeardownTimeout {
        /// The unresponsive worker's instance id.
        instance: String,
        /// The configured deadline in milliseconds.
        ms: u64,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Result type for RPC calls.
pub type RpcResult<T> = Result<T, RpcError>;

/// Result type for service invocations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Boxed error type for user-supplied hooks (setup/teardown bodies).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
