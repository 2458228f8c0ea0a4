//! # Lattice Core
//!
//! Foundational types and capabilities for the Lattice orchestration
//! runtime.
//!
//! This layer defines everything the engine, the RPC protocol, and worker
//! hosts agree on, without committing to a transport or an execution
//! strategy:
//!
//! - The plugin model: [`PluginType`], [`PluginInstance`], [`Wiring`],
//!   [`Requirements`], and the hook types threaded through setup/teardown.
//! - The [`Service`] trait — dynamically invocable service values, the
//!   statically typed stand-in for reflective proxies.
//! - Schema capabilities: [`ConfigSchema`] and [`ServiceContract`].
//! - The wire protocol: [`Frame`] and [`WireError`].
//! - Transport capabilities: [`Channel`] and [`Spawner`].
//! - The error taxonomy shared by every layer.

pub mod channel;
pub mod error;
pub mod plugin;
pub mod protocol;
pub mod schema;
pub mod service;
pub mod spawn;

pub use channel::{Channel, ChannelEnd, CloseHandler, FrameHandler, MemoryChannel, memory_pair};
pub use error::{
    BoxError, ChannelError, ChannelResult, GraphError, GraphResult, LifecycleError,
    LifecycleResult, RegistryError, RegistryResult, RpcError, RpcResult, SchemaError,
    SchemaResult, ServiceError, ServiceResult,
};
pub use plugin::{
    Deps, ExecutionMode, PluginInstance, PluginType, PluginTypeBuilder, Requirements,
    SetupContext, SetupFn, TeardownFn, Wiring,
};
pub use protocol::{CallId, Frame, WireError};
pub use schema::{
    AnyValue, ConfigSchema, ContractHandle, MethodSet, RequiredKeys, SchemaHandle,
    ServiceContract,
};
pub use service::{FnService, NullService, Service, ServiceArc, ServiceLookup};
pub use spawn::{SpawnError, Spawner, WorkerBundle, WorkerHandle};
