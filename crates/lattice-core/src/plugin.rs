//! Plugin type and instance model.
//!
//! A [`PluginType`] is a reusable definition: config schema, requirement
//! contracts, lifecycle hooks, and an optional entry point for worker mode.
//! A [`PluginInstance`] is a configured, uniquely identified node referencing
//! a type and a [`Wiring`] map. Both are immutable after registration.
//!
//! # Defining a type
//!
//! ```rust,ignore
//! let logger_type = PluginType::builder("logger")
//!     .config_schema(AnyValue::schema())
//!     .setup(|_ctx, _cfg, _deps, _id| async {
//!         Ok(Some(FnService::new()
//!             .method("info", |args| async move { Ok(json!(null)) })
//!             .into_arc()))
//!     })
//!     .build();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{BoxError, GraphError, GraphResult, RegistryResult, ServiceError, ServiceResult};
use crate::schema::{AnyValue, ContractHandle, SchemaHandle};
use crate::service::ServiceArc;

// =============================================================================
// Execution mode
// =============================================================================

/// Where an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// In-process, on the engine's control task.
    #[default]
    Main,
    /// In an isolated worker behind the RPC boundary.
    Worker,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Main => write!(f, "main"),
            ExecutionMode::Worker => write!(f, "worker"),
        }
    }
}

// =============================================================================
// Ordered mappings: Requirements and Wiring
// =============================================================================

/// Ordered mapping `requirement name → contract`.
///
/// Insertion order is preserved; it is the order dependencies are
/// materialized in and part of the resolver's determinism guarantee.
#[derive(Clone, Default)]
pub struct Requirements {
    entries: Vec<(String, ContractHandle)>,
}

impl Requirements {
    /// Creates an empty requirements map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a requirement. Fails on a duplicate name — requirements are a
    /// mapping, not a multimap.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        contract: ContractHandle,
    ) -> GraphResult<()> {
        let name = name.into();
        if self.entries.iter().any(|(n, _)| *n == name) {
            return Err(GraphError::DuplicateRequirement { requirement: name });
        }
        self.entries.push((name, contract));
        Ok(())
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContractHandle)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Requirement names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of declared requirements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requirements are declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered mapping `requirement name → target instance id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wiring {
    entries: Vec<(String, String)>,
}

impl Wiring {
    /// Creates an empty wiring map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a wiring entry. Fails on a duplicate requirement name.
    pub fn insert(
        &mut self,
        requirement: impl Into<String>,
        target: impl Into<String>,
    ) -> GraphResult<()> {
        let requirement = requirement.into();
        if self.entries.iter().any(|(n, _)| *n == requirement) {
            return Err(GraphError::DuplicateWiring { requirement });
        }
        self.entries.push((requirement, target.into()));
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert) that panics on duplicates.
    ///
    /// Intended for literal wiring tables where a duplicate is a programming
    /// error.
    pub fn with(mut self, requirement: impl Into<String>, target: impl Into<String>) -> Self {
        self.insert(requirement, target)
            .expect("duplicate wiring entry in literal wiring table");
        self
    }

    /// Looks up the target instance id for a requirement name.
    ///
    /// Wiring must be present *and non-empty*: an entry whose target is the
    /// empty string reads as absent, so every resolution site treats it as
    /// unwired.
    pub fn get(&self, requirement: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == requirement)
            .map(|(_, t)| t.as_str())
            .filter(|target| !target.is_empty())
    }

    /// Iterates `(requirement, target)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    /// Target instance ids in insertion order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, t)| t.as_str())
    }

    /// Whether the wiring has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// SetupContext and Deps
// =============================================================================

/// The context object handed to every setup hook.
///
/// On the host this is backed by the engine's service registry; inside a
/// worker it is a mock whose `get_service` fails fast (workers reach their
/// dependencies through [`Deps`], never through a local registry).
pub trait SetupContext: Send + Sync {
    /// Publishes `service` under `instance_id`.
    fn register_service(&self, instance_id: &str, service: ServiceArc) -> RegistryResult<()>;

    /// Fetches a published service by instance id.
    fn get_service(&self, instance_id: &str) -> RegistryResult<ServiceArc>;

    /// Whether a service is published under `instance_id`.
    fn has_service(&self, instance_id: &str) -> bool;
}

/// The dependency handles passed to a setup hook, keyed by requirement name.
///
/// In main mode these are the real registered services; in worker mode they
/// are uplink-backed proxies. Setups cannot tell the difference.
#[derive(Clone, Default)]
pub struct Deps {
    map: HashMap<String, ServiceArc>,
}

impl Deps {
    /// Creates an empty dependency set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle under a requirement name.
    pub fn insert(&mut self, requirement: impl Into<String>, service: ServiceArc) {
        self.map.insert(requirement.into(), service);
    }

    /// Looks up a handle by requirement name.
    pub fn get(&self, requirement: &str) -> Option<&ServiceArc> {
        self.map.get(requirement)
    }

    /// Looks up a handle, failing with a [`ServiceError`] when absent.
    pub fn require(&self, requirement: &str) -> ServiceResult<&ServiceArc> {
        self.map.get(requirement).ok_or_else(|| {
            ServiceError::Failed(format!("no dependency named '{requirement}'"))
        })
    }

    /// Number of handles.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// =============================================================================
// Hook types
// =============================================================================

/// Stored setup hook.
///
/// Receives the context, the schema-validated config, the dependency
/// handles, and the instance id. May publish a service through the context,
/// return one, or both; when both happen the context registration wins.
pub type SetupFn = Arc<
    dyn Fn(
            Arc<dyn SetupContext>,
            Value,
            Deps,
            String,
        ) -> BoxFuture<'static, Result<Option<ServiceArc>, BoxError>>
        + Send
        + Sync,
>;

/// Stored teardown hook, called with the instance id during `stop()`.
pub type TeardownFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

// =============================================================================
// PluginType
// =============================================================================

/// A reusable plugin definition. Immutable after registration.
#[derive(Clone)]
pub struct PluginType {
    id: String,
    config_schema: SchemaHandle,
    requirements: Requirements,
    entry_point: Option<String>,
    setup: SetupFn,
    teardown: Option<TeardownFn>,
}

impl PluginType {
    /// Starts a builder for a type with the given id.
    pub fn builder(id: impl Into<String>) -> PluginTypeBuilder {
        PluginTypeBuilder::new(id)
    }

    /// The type id, unique within a definition store.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The schema instance configs are parsed with at start.
    pub fn config_schema(&self) -> &SchemaHandle {
        &self.config_schema
    }

    /// The ordered requirement → contract map.
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Locator for the worker host to resolve this type's setup code.
    ///
    /// Required iff any instance of the type runs in worker mode.
    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    /// The setup hook.
    pub fn setup(&self) -> &SetupFn {
        &self.setup
    }

    /// The optional teardown hook.
    pub fn teardown(&self) -> Option<&TeardownFn> {
        self.teardown.as_ref()
    }
}

impl std::fmt::Debug for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginType")
            .field("id", &self.id)
            .field(
                "requirements",
                &self.requirements.names().collect::<Vec<_>>(),
            )
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

/// Builder for [`PluginType`].
pub struct PluginTypeBuilder {
    id: String,
    config_schema: SchemaHandle,
    requirements: Requirements,
    entry_point: Option<String>,
    setup: Option<SetupFn>,
    teardown: Option<TeardownFn>,
}

impl PluginTypeBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config_schema: AnyValue::schema(),
            requirements: Requirements::new(),
            entry_point: None,
            setup: None,
            teardown: None,
        }
    }

    /// Sets the config schema. Defaults to the permissive [`AnyValue`].
    pub fn config_schema(mut self, schema: SchemaHandle) -> Self {
        self.config_schema = schema;
        self
    }

    /// Declares a requirement. Panics on a duplicate name — type
    /// definitions are literal tables and a duplicate is a programming error.
    pub fn requires(mut self, name: impl Into<String>, contract: ContractHandle) -> Self {
        self.requirements
            .insert(name, contract)
            .expect("duplicate requirement in plugin type definition");
        self
    }

    /// Sets the worker entry point locator.
    pub fn entry_point(mut self, entry: impl Into<String>) -> Self {
        self.entry_point = Some(entry.into());
        self
    }

    /// Sets the setup hook from an async closure.
    pub fn setup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<dyn SetupContext>, Value, Deps, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Option<ServiceArc>, BoxError>> + Send + 'static,
    {
        self.setup = Some(Arc::new(move |ctx, cfg, deps, id| {
            Box::pin(hook(ctx, cfg, deps, id))
        }));
        self
    }

    /// Sets the teardown hook from an async closure.
    pub fn teardown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.teardown = Some(Arc::new(move |id| Box::pin(hook(id))));
        self
    }

    /// Finishes the type. A type without a setup hook gets a no-op setup
    /// that exposes no service.
    pub fn build(self) -> PluginType {
        PluginType {
            id: self.id,
            config_schema: self.config_schema,
            requirements: self.requirements,
            entry_point: self.entry_point,
            setup: self
                .setup
                .unwrap_or_else(|| Arc::new(|_, _, _, _| Box::pin(async { Ok(None) }))),
            teardown: self.teardown,
        }
    }
}

// =============================================================================
// PluginInstance
// =============================================================================

/// A configured node in the orchestration graph. Immutable after
/// registration.
#[derive(Debug, Clone)]
pub struct PluginInstance {
    id: String,
    type_id: String,
    config: Value,
    wiring: Wiring,
    mode: ExecutionMode,
}

impl PluginInstance {
    /// Creates an instance of `type_id` with default config, empty wiring,
    /// and main-mode execution; refine with the `with_*` methods.
    pub fn new(id: impl Into<String>, type_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            config: Value::Null,
            wiring: Wiring::new(),
            mode: ExecutionMode::Main,
        }
    }

    /// Sets the raw config value (validated at start).
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Sets the wiring table.
    pub fn with_wiring(mut self, wiring: Wiring) -> Self {
        self.wiring = wiring;
        self
    }

    /// Adds one wiring entry. Panics on duplicates, like [`Wiring::with`].
    pub fn wire(mut self, requirement: impl Into<String>, target: impl Into<String>) -> Self {
        self.wiring = self.wiring.with(requirement, target);
        self
    }

    /// Sets the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Globally unique instance id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The referenced type id.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// The raw config value.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// The wiring table.
    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    /// Where this instance runs.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}
