//! The lifecycle engine.
//!
//! [`Orchestrator`] is the central owner of all registered definitions and
//! instances. It:
//!
//! - Accepts [`PluginType`]s and [`PluginInstance`]s and enforces identity
//!   and lock semantics through its stores.
//! - Drives start/stop in the resolver's dependency order on a single
//!   control task; every setup completes before the next one begins, which
//!   is what makes runs deterministic.
//! - Runs `main`-mode instances in process and spawns `worker`-mode
//!   instances through the configured [`Spawner`], installing the uplink
//!   server and the downlink proxy around each worker.
//! - Escalates worker teardown from cooperative (`TEARDOWN` handshake) to
//!   forced termination when the deadline passes, and terminates any
//!   still-live workers when dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = Orchestrator::new(spawner);
//! engine.register_definition(logger_type)?;
//! engine.lock_definitions();
//! engine.register_plugin(PluginInstance::new("sys-logger", "logger"))?;
//! let report = engine.start(StartOptions::default()).await?;
//! // …
//! engine.stop(StopOptions::default()).await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use lattice_core::channel::{Channel, ChannelEnd};
use lattice_core::error::{
    GraphError, LifecycleError, LifecycleResult, RegistryError, RegistryResult, RpcError,
};
use lattice_core::plugin::{
    Deps, ExecutionMode, PluginInstance, PluginType, SetupContext,
};
use lattice_core::schema::ConfigSchema;
use lattice_core::service::{ServiceArc, ServiceLookup};
use lattice_core::spawn::{Spawner, WorkerBundle, WorkerHandle};
use lattice_rpc::{ClientEvents, RpcClient, UplinkServer};

use crate::diagram;
use crate::registry::ServiceRegistry;
use crate::resolver;
use crate::store::{DefinitionStore, InstanceStore};

/// Default deadline for downlink and uplink method calls.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default deadline for a worker's cooperative teardown.
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_millis(5_000);

// =============================================================================
// Options and reports
// =============================================================================

/// Options for [`Orchestrator::start`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Resolve the order and render the wiring diagram without running any
    /// setup.
    pub dry_run: bool,
}

/// Options for [`Orchestrator::stop`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    /// Report the teardown order without tearing anything down.
    pub dry_run: bool,
}

/// Outcome of [`Orchestrator::start`].
#[derive(Debug, Clone)]
pub struct StartReport {
    /// The resolved start order.
    pub order: Vec<String>,
    /// The wiring diagram, rendered on dry runs.
    pub diagram: Option<String>,
}

/// Outcome of [`Orchestrator::stop`].
#[derive(Debug, Clone)]
pub struct StopReport {
    /// The teardown order (reverse of the start order).
    pub order: Vec<String>,
}

// =============================================================================
// Worker records
// =============================================================================

/// Lifecycle state of a spawned worker.
///
/// ```text
/// Spawning --(WORKER_READY)--> Ready --(TEARDOWN sent)--> TearingDown
///     |                          |                            |
///     +--------(crash)-----------+       (TEARDOWN_COMPLETE | timeout)
///                                |                            |
///                                +--------> Terminated <------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned; `WORKER_READY` not yet observed.
    Spawning,
    /// The worker announced readiness.
    Ready,
    /// `TEARDOWN` sent; acknowledgement pending.
    TearingDown,
    /// Gone — cooperatively, forcibly, or by crash.
    Terminated,
}

struct WorkerRecord {
    client: Arc<RpcClient>,
    handle: Box<dyn WorkerHandle>,
    uplink_host: ChannelEnd,
    state: Arc<Mutex<WorkerState>>,
}

// =============================================================================
// SetupContext backed by the engine registry
// =============================================================================

/// The context main-mode setups receive: a thin view over the engine's
/// service registry that tracks what was published so `stop()` can retract
/// it.
struct RegistryContext {
    registry: Arc<ServiceRegistry>,
    published: Arc<Mutex<Vec<String>>>,
}

impl SetupContext for RegistryContext {
    fn register_service(&self, instance_id: &str, service: ServiceArc) -> RegistryResult<()> {
        self.registry.register(instance_id, None, service)?;
        self.published.lock().push(instance_id.to_string());
        Ok(())
    }

    fn get_service(&self, instance_id: &str) -> RegistryResult<ServiceArc> {
        self.registry.get(instance_id)
    }

    fn has_service(&self, instance_id: &str) -> bool {
        self.registry.has(instance_id)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// The process-wide orchestration engine.
///
/// Multiple engines coexist in one process without interference: every
/// engine owns its stores, its registry, and its workers. Nothing here is a
/// global.
pub struct Orchestrator {
    definitions: DefinitionStore,
    instances: InstanceStore,
    registry: Arc<ServiceRegistry>,
    spawner: Arc<dyn Spawner>,
    workers: Mutex<HashMap<String, WorkerRecord>>,
    rpc_timeout: Duration,
    teardown_timeout: Duration,
    /// Ids started by the last `start()`, in start order.
    started: Mutex<Vec<String>>,
    /// Service ids the engine published (proxies, auto-registered and
    /// context-registered services); retracted at stop.
    published: Arc<Mutex<Vec<String>>>,
}

impl Orchestrator {
    /// Creates an engine with default timeouts.
    pub fn new(spawner: Arc<dyn Spawner>) -> Self {
        Self {
            definitions: DefinitionStore::new(),
            instances: InstanceStore::new(),
            registry: Arc::new(ServiceRegistry::new()),
            spawner,
            workers: Mutex::new(HashMap::new()),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
            started: Mutex::new(Vec::new()),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sets the deadline for every downlink method call.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets the deadline for cooperative worker teardown.
    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a plugin type. Fails once [`lock_definitions`](Self::lock_definitions)
    /// has been called.
    pub fn register_definition(&self, plugin_type: PluginType) -> RegistryResult<()> {
        self.definitions.register(plugin_type)
    }

    /// Locks the type store. Idempotent and irreversible.
    pub fn lock_definitions(&self) {
        self.definitions.lock();
    }

    /// Registers a plugin instance. Allowed until `start()` begins.
    pub fn register_plugin(&self, instance: PluginInstance) -> RegistryResult<()> {
        if !self.definitions.contains(instance.type_id()) {
            return Err(RegistryError::UnknownType {
                instance: instance.id().to_string(),
                type_id: instance.type_id().to_string(),
            });
        }
        self.instances.register(instance)
    }

    /// The engine's service registry.
    ///
    /// The host may pre-register externally supplied services here before
    /// `start()`; wiring targets that are not instances resolve against
    /// them.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Starts all instances in resolved dependency order.
    ///
    /// On a dry run the order is resolved and the wiring diagram rendered,
    /// but no setup runs and no state changes. On failure, instances started
    /// so far are torn down in reverse before the error is returned.
    pub async fn start(&self, options: StartOptions) -> LifecycleResult<StartReport> {
        if options.dry_run {
            let snapshot = self.instances.snapshot();
            let order = resolver::resolve_order(&snapshot)?;
            let rendered = diagram::render(&snapshot);
            info!(instances = order.len(), "Dry run: order resolved");
            return Ok(StartReport {
                order,
                diagram: Some(rendered),
            });
        }

        self.instances.seal();
        let snapshot = self.instances.snapshot();
        let order = resolver::resolve_order(&snapshot)?;
        info!(instances = order.len(), "Starting instances");

        for id in &order {
            match self.start_instance(id).await {
                Ok(()) => self.started.lock().push(id.clone()),
                Err(e) => {
                    error!(
                        instance = %id,
                        error = %e,
                        "Startup aborted — tearing down started instances"
                    );
                    self.stop_started().await;
                    return Err(e);
                }
            }
        }

        info!(count = order.len(), "All instances started");
        Ok(StartReport {
            order,
            diagram: None,
        })
    }

    /// Stops all started instances in reverse start order.
    ///
    /// Teardown errors are logged and suppressed so every instance gets its
    /// chance to shut down.
    pub async fn stop(&self, options: StopOptions) -> StopReport {
        let order: Vec<String> = self.started.lock().iter().rev().cloned().collect();
        if options.dry_run {
            return StopReport { order };
        }
        info!(instances = order.len(), "Stopping instances");
        self.stop_started().await;
        StopReport { order }
    }

    /// Current state of a spawned worker, if one is recorded.
    pub fn worker_state(&self, instance_id: &str) -> Option<WorkerState> {
        self.workers
            .lock()
            .get(instance_id)
            .map(|record| *record.state.lock())
    }

    /// Snapshot of engine counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            types: self.definitions.len(),
            instances: self.instances.len(),
            services: self.registry.len(),
            workers: self.workers.lock().len(),
            running: !self.started.lock().is_empty(),
        }
    }

    // ─── Start internals ─────────────────────────────────────────────────────

    async fn start_instance(&self, id: &str) -> LifecycleResult<()> {
        let instance = self
            .instances
            .get(id)
            .expect("resolved order only references registered instances");
        let plugin_type =
            self.definitions
                .get(instance.type_id())
                .ok_or_else(|| RegistryError::UnknownType {
                    instance: id.to_string(),
                    type_id: instance.type_id().to_string(),
                })?;

        let config = plugin_type
            .config_schema()
            .parse(instance.config())
            .map_err(|source| LifecycleError::ConfigInvalid {
                instance: id.to_string(),
                source,
            })?;

        match instance.mode() {
            ExecutionMode::Main => self.start_main(&instance, &plugin_type, config).await,
            ExecutionMode::Worker => self.start_worker(&instance, &plugin_type, config),
        }
    }

    async fn start_main(
        &self,
        instance: &PluginInstance,
        plugin_type: &PluginType,
        config: Value,
    ) -> LifecycleResult<()> {
        let mut deps = Deps::new();
        for (requirement, _contract) in plugin_type.requirements().iter() {
            let target =
                instance
                    .wiring()
                    .get(requirement)
                    .ok_or_else(|| GraphError::WiringMissing {
                        instance: instance.id().to_string(),
                        requirement: requirement.to_string(),
                    })?;
            let service = self.registry.get(target)?;
            deps.insert(requirement, service);
        }

        debug!(instance = %instance.id(), "Running setup");
        let ctx: Arc<dyn SetupContext> = Arc::new(RegistryContext {
            registry: Arc::clone(&self.registry),
            published: Arc::clone(&self.published),
        });
        let produced = (plugin_type.setup())(ctx, config, deps, instance.id().to_string())
            .await
            .map_err(|e| LifecycleError::SetupFailed {
                instance: instance.id().to_string(),
                reason: e.to_string(),
            })?;

        // A service registered through the context wins; the returned value
        // is only published when the id is still free.
        if let Some(service) = produced {
            if !self.registry.has(instance.id()) {
                self.registry.register(instance.id(), None, service)?;
                self.published.lock().push(instance.id().to_string());
            }
        }
        info!(instance = %instance.id(), "Instance started");
        Ok(())
    }

    fn start_worker(
        &self,
        instance: &PluginInstance,
        plugin_type: &PluginType,
        config: Value,
    ) -> LifecycleResult<()> {
        let entry_point =
            plugin_type
                .entry_point()
                .ok_or_else(|| LifecycleError::WorkerSpawnFailed {
                    instance: instance.id().to_string(),
                    reason: format!("type '{}' declares no entry point", plugin_type.id()),
                })?;

        // No deps are assembled host-side, but the wiring must still cover
        // every declared requirement before the worker comes up.
        for name in plugin_type.requirements().names() {
            if instance.wiring().get(name).is_none() {
                return Err(GraphError::WiringMissing {
                    instance: instance.id().to_string(),
                    requirement: name.to_string(),
                }
                .into());
            }
        }

        // Uplink: the worker's path back into its declared dependencies.
        let (uplink_host, uplink_worker) = self.spawner.channel_pair();
        UplinkServer::new(
            Arc::clone(&self.registry) as Arc<dyn ServiceLookup>,
            instance.wiring().clone(),
        )
        .attach(Arc::clone(&uplink_host));

        let (downlink_host, downlink_worker) = self.spawner.channel_pair();
        let bundle = WorkerBundle {
            instance_id: instance.id().to_string(),
            type_id: plugin_type.id().to_string(),
            entry_point: entry_point.to_string(),
            config,
            uplink: uplink_worker,
        };
        let handle = self.spawner.spawn(bundle, downlink_worker).map_err(|e| {
            LifecycleError::WorkerSpawnFailed {
                instance: instance.id().to_string(),
                reason: e.to_string(),
            }
        })?;

        let state = Arc::new(Mutex::new(WorkerState::Spawning));
        let ready_state = Arc::clone(&state);
        let gone_state = Arc::clone(&state);
        let events = ClientEvents {
            on_ready: Some(Arc::new(move |instance_id: String| {
                let mut state = ready_state.lock();
                if *state == WorkerState::Spawning {
                    *state = WorkerState::Ready;
                }
                info!(instance = %instance_id, "Worker ready");
            })),
            on_gone: Some(Arc::new(move || {
                let mut state = gone_state.lock();
                if *state != WorkerState::Terminated {
                    *state = WorkerState::Terminated;
                    warn!("Worker channel lost — outstanding calls rejected");
                }
            })),
        };
        let client = RpcClient::connect(downlink_host, self.rpc_timeout, events);

        // Register the proxy immediately; calls issued before the worker is
        // ready queue on the channel and complete once it processes them.
        self.registry
            .register(instance.id(), None, Arc::clone(&client) as ServiceArc)?;
        self.published.lock().push(instance.id().to_string());

        self.workers.lock().insert(
            instance.id().to_string(),
            WorkerRecord {
                client,
                handle,
                uplink_host,
                state,
            },
        );
        info!(instance = %instance.id(), "Worker spawned");
        Ok(())
    }

    // ─── Stop internals ──────────────────────────────────────────────────────

    async fn stop_started(&self) {
        let order: Vec<String> = self.started.lock().iter().rev().cloned().collect();
        for id in &order {
            self.stop_instance(id).await;
        }
        self.started.lock().clear();
    }

    async fn stop_instance(&self, id: &str) {
        let Some(instance) = self.instances.get(id) else {
            return;
        };

        match instance.mode() {
            ExecutionMode::Main => {
                if let Some(plugin_type) = self.definitions.get(instance.type_id())
                    && let Some(teardown) = plugin_type.teardown()
                {
                    debug!(instance = %id, "Running teardown");
                    if let Err(e) = teardown(id.to_string()).await {
                        error!(instance = %id, error = %e, "Teardown failed — continuing");
                    }
                }
            }
            ExecutionMode::Worker => {
                let record = self.workers.lock().remove(id);
                if let Some(record) = record {
                    *record.state.lock() = WorkerState::TearingDown;
                    match record.client.teardown(self.teardown_timeout).await {
                        Ok(()) => debug!(instance = %id, "Worker tore down cooperatively"),
                        Err(RpcError::Timeout { ms, .. }) => {
                            warn!(
                                instance = %id,
                                ms,
                                "Worker exceeded the teardown deadline — terminating"
                            );
                        }
                        Err(e) => {
                            warn!(instance = %id, error = %e, "Worker teardown failed — terminating");
                        }
                    }
                    // Hard terminate on every path to release the channels.
                    record.handle.terminate();
                    record.client.close();
                    record.uplink_host.close();
                    *record.state.lock() = WorkerState::Terminated;
                    info!(instance = %id, "Worker terminated");
                }
            }
        }

        let mut published = self.published.lock();
        if published.iter().any(|p| p == id) {
            self.registry.remove(id);
            published.retain(|p| p != id);
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let mut workers = self.workers.lock();
        for (id, record) in workers.drain() {
            warn!(instance = %id, "Engine dropped with live worker — terminating");
            record.handle.terminate();
            *record.state.lock() = WorkerState::Terminated;
        }
    }
}

// =============================================================================
// EngineStats
// =============================================================================

/// Counters describing an engine at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Registered plugin types.
    pub types: usize,
    /// Registered plugin instances.
    pub instances: usize,
    /// Published services.
    pub services: usize,
    /// Live worker records.
    pub workers: usize,
    /// Whether a start order is currently active.
    pub running: bool,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} type(s), {} instance(s), {} service(s), {} worker(s), {}",
            self.types,
            self.instances,
            self.services,
            self.workers,
            if self.running { "running" } else { "stopped" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::error::RegistryError;
    use lattice_core::plugin::PluginInstance;
    use lattice_core::schema::{AnyValue, RequiredKeys};
    use lattice_core::service::{FnService, Service};
    use lattice_worker::{ModuleRegistry, TaskSpawner};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn new_engine(modules: ModuleRegistry) -> Orchestrator {
        Orchestrator::new(TaskSpawner::new(modules).into_arc())
    }

    fn query_service() -> ServiceArc {
        FnService::new()
            .method("query", |args| async move {
                assert_eq!(args[0], json!("SELECT 1"));
                Ok(json!([1]))
            })
            .into_arc()
    }

    /// Type `L`: no requirements, exposes `info`, records lifecycle in `trace`.
    fn logger_type(trace: Trace, infos: Arc<AtomicUsize>) -> PluginType {
        PluginType::builder("L")
            .setup({
                let trace = Arc::clone(&trace);
                move |_ctx, _cfg, _deps, id| {
                    let trace = Arc::clone(&trace);
                    let infos = Arc::clone(&infos);
                    async move {
                        trace.lock().push(format!("setup:{id}"));
                        Ok(Some(
                            FnService::new()
                                .method("info", move |args| {
                                    let infos = Arc::clone(&infos);
                                    async move {
                                        infos.fetch_add(1, Ordering::SeqCst);
                                        Ok(args[0].clone())
                                    }
                                })
                                .into_arc(),
                        ))
                    }
                }
            })
            .teardown({
                let trace = Arc::clone(&trace);
                move |id| {
                    let trace = Arc::clone(&trace);
                    async move {
                        trace.lock().push(format!("teardown:{id}"));
                        Ok(())
                    }
                }
            })
            .build()
    }

    /// Type `D`: requires `logger`, greets it once, exposes `query`.
    fn db_type(trace: Trace) -> PluginType {
        PluginType::builder("D")
            .requires("logger", AnyValue::contract())
            .setup({
                let trace = Arc::clone(&trace);
                move |_ctx, _cfg, deps, id| {
                    let trace = Arc::clone(&trace);
                    async move {
                        trace.lock().push(format!("setup:{id}"));
                        let logger = deps.require("logger")?.clone();
                        logger.invoke("info", vec![json!("db up")]).await?;
                        Ok(Some(query_service()))
                    }
                }
            })
            .teardown({
                let trace = Arc::clone(&trace);
                move |id| {
                    let trace = Arc::clone(&trace);
                    async move {
                        trace.lock().push(format!("teardown:{id}"));
                        Ok(())
                    }
                }
            })
            .build()
    }

    /// Type `A`: requires `logger` and `db`, queries the db during setup.
    fn api_type(trace: Trace) -> PluginType {
        PluginType::builder("A")
            .requires("logger", AnyValue::contract())
            .requires("db", AnyValue::contract())
            .setup({
                let trace = Arc::clone(&trace);
                move |_ctx, _cfg, deps, id| {
                    let trace = Arc::clone(&trace);
                    async move {
                        trace.lock().push(format!("setup:{id}"));
                        let db = deps.require("db")?.clone();
                        let rows = db.invoke("query", vec![json!("SELECT 1")]).await?;
                        assert_eq!(rows, json!([1]));
                        Ok(Some(
                            FnService::new()
                                .method("handle", |_| async { Ok(json!("ok")) })
                                .into_arc(),
                        ))
                    }
                }
            })
            .build()
    }

    fn chain_instances() -> [PluginInstance; 3] {
        [
            PluginInstance::new("sys-logger", "L"),
            PluginInstance::new("db", "D").wire("logger", "sys-logger"),
            PluginInstance::new("api", "A")
                .wire("logger", "sys-logger")
                .wire("db", "db"),
        ]
    }

    #[tokio::test]
    async fn linear_chain_starts_in_order_and_stops_reversed() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(AtomicUsize::new(0));
        let engine = new_engine(ModuleRegistry::new());
        engine
            .register_definition(logger_type(Arc::clone(&trace), Arc::clone(&infos)))
            .unwrap();
        engine.register_definition(db_type(Arc::clone(&trace))).unwrap();
        engine.register_definition(api_type(Arc::clone(&trace))).unwrap();
        engine.lock_definitions();
        for instance in chain_instances() {
            engine.register_plugin(instance).unwrap();
        }

        let report = engine.start(StartOptions::default()).await.unwrap();
        assert_eq!(report.order, vec!["sys-logger", "db", "api"]);
        assert!(report.diagram.is_none());
        for id in ["sys-logger", "db", "api"] {
            assert!(engine.registry().has(id));
        }
        assert_eq!(
            *trace.lock(),
            vec!["setup:sys-logger", "setup:db", "setup:api"]
        );
        assert!(engine.stats().running);

        let stop = engine.stop(StopOptions::default()).await;
        assert_eq!(stop.order, vec!["api", "db", "sys-logger"]);
        assert_eq!(
            *trace.lock(),
            vec![
                "setup:sys-logger",
                "setup:db",
                "setup:api",
                "teardown:db",
                "teardown:sys-logger"
            ]
        );
        assert!(engine.registry().is_empty());
        assert!(!engine.stats().running);
    }

    #[tokio::test]
    async fn worker_in_the_middle_is_location_transparent() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(AtomicUsize::new(0));

        // The db type lives behind an entry point and runs in a worker; its
        // setup stalls briefly so the api's first call provably queues.
        let worker_db = PluginType::builder("D")
            .requires("logger", AnyValue::contract())
            .entry_point("plugins/db")
            .setup(|_ctx, _cfg, deps, _id| async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                let logger = deps.require("logger")?.clone();
                logger.invoke("info", vec![json!("db up")]).await?;
                Ok(Some(query_service()))
            })
            .build();
        let modules = ModuleRegistry::new().with_module("plugins/db", [worker_db.clone()]);

        let engine = new_engine(modules);
        engine
            .register_definition(logger_type(Arc::clone(&trace), Arc::clone(&infos)))
            .unwrap();
        engine.register_definition(worker_db).unwrap();
        engine.register_definition(api_type(Arc::clone(&trace))).unwrap();
        engine.lock_definitions();
        engine
            .register_plugin(PluginInstance::new("sys-logger", "L"))
            .unwrap();
        engine
            .register_plugin(
                PluginInstance::new("db", "D")
                    .with_mode(ExecutionMode::Worker)
                    .wire("logger", "sys-logger"),
            )
            .unwrap();
        engine
            .register_plugin(
                PluginInstance::new("api", "A")
                    .wire("logger", "sys-logger")
                    .wire("db", "db"),
            )
            .unwrap();

        let report = engine.start(StartOptions::default()).await.unwrap();
        assert_eq!(report.order, vec!["sys-logger", "db", "api"]);
        // The api's setup already queried the worker-backed proxy.
        for id in ["sys-logger", "db", "api"] {
            assert!(engine.registry().has(id));
        }
        // Exactly one uplink call reached the logger.
        assert_eq!(infos.load(Ordering::SeqCst), 1);

        // The worker announced readiness after its delayed setup.
        let deadline = Instant::now() + Duration::from_secs(1);
        while engine.worker_state("db") != Some(WorkerState::Ready) {
            assert!(Instant::now() < deadline, "worker never became ready");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Direct calls through the registry hit the worker too.
        let proxy = engine.registry().get("db").unwrap();
        assert_eq!(
            proxy.invoke("query", vec![json!("SELECT 1")]).await.unwrap(),
            json!([1])
        );

        engine.stop(StopOptions::default()).await;
        assert_eq!(engine.stats().workers, 0);
    }

    #[tokio::test]
    async fn cycle_aborts_startup_with_full_path() {
        let engine = new_engine(ModuleRegistry::new());
        engine
            .register_definition(PluginType::builder("T").build())
            .unwrap();
        engine
            .register_plugin(PluginInstance::new("x", "T").wire("a", "y"))
            .unwrap();
        engine
            .register_plugin(PluginInstance::new("y", "T").wire("b", "x"))
            .unwrap();

        let err = engine.start(StartOptions::default()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains('x'));
        assert!(message.contains('y'));
        assert!(message.contains("->"));
    }

    #[tokio::test]
    async fn missing_wiring_aborts_startup() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let engine = new_engine(ModuleRegistry::new());
        engine.register_definition(db_type(trace)).unwrap();
        engine
            .register_plugin(PluginInstance::new("app", "D"))
            .unwrap();

        let err = engine.start(StartOptions::default()).await.unwrap_err();
        match err {
            LifecycleError::Graph(GraphError::WiringMissing {
                instance,
                requirement,
            }) => {
                assert_eq!(instance, "app");
                assert_eq!(requirement, "logger");
            }
            other => panic!("expected WiringMissing, got {other}"),
        }
    }

    #[tokio::test]
    async fn empty_wiring_target_is_missing_wiring() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let engine = new_engine(ModuleRegistry::new());
        engine.register_definition(db_type(trace)).unwrap();
        engine
            .register_plugin(PluginInstance::new("app", "D").wire("logger", ""))
            .unwrap();

        let err = engine.start(StartOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Graph(GraphError::WiringMissing { instance, requirement })
                if instance == "app" && requirement == "logger"
        ));
    }

    #[tokio::test]
    async fn worker_with_empty_wiring_target_fails_at_startup() {
        let worker_db = PluginType::builder("D")
            .requires("logger", AnyValue::contract())
            .entry_point("plugins/db")
            .build();
        let modules = ModuleRegistry::new().with_module("plugins/db", [worker_db.clone()]);

        let engine = new_engine(modules);
        engine.register_definition(worker_db).unwrap();
        engine
            .register_plugin(
                PluginInstance::new("db", "D")
                    .with_mode(ExecutionMode::Worker)
                    .wire("logger", ""),
            )
            .unwrap();

        // The defect surfaces before the worker is spawned, not as a later
        // uplink failure.
        let err = engine.start(StartOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Graph(GraphError::WiringMissing { instance, requirement })
                if instance == "db" && requirement == "logger"
        ));
        assert_eq!(engine.stats().workers, 0);
    }

    #[tokio::test]
    async fn external_services_satisfy_wiring_without_joining_the_order() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let engine = new_engine(ModuleRegistry::new());
        engine
            .registry()
            .register(
                "ext-logger",
                None,
                FnService::new()
                    .method("info", |args| async move { Ok(args[0].clone()) })
                    .into_arc(),
            )
            .unwrap();
        engine.register_definition(db_type(trace)).unwrap();
        engine
            .register_plugin(PluginInstance::new("app", "D").wire("logger", "ext-logger"))
            .unwrap();

        let report = engine.start(StartOptions::default()).await.unwrap();
        assert_eq!(report.order, vec!["app"]);

        engine.stop(StopOptions::default()).await;
        // The externally supplied service is not the engine's to retract.
        assert!(engine.registry().has("ext-logger"));
        assert!(!engine.registry().has("app"));
    }

    #[tokio::test]
    async fn stalled_worker_teardown_is_escalated_to_a_kill() {
        let sleepy = PluginType::builder("sleepy")
            .entry_point("plugins/sleepy")
            .setup(|_ctx, _cfg, _deps, _id| async {
                Ok(Some(FnService::new().into_arc()))
            })
            .teardown(|_id| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok(())
            })
            .build();
        let modules = ModuleRegistry::new().with_module("plugins/sleepy", [sleepy.clone()]);

        let engine = new_engine(modules).with_teardown_timeout(Duration::from_millis(100));
        engine.register_definition(sleepy).unwrap();
        engine
            .register_plugin(
                PluginInstance::new("slow", "sleepy").with_mode(ExecutionMode::Worker),
            )
            .unwrap();

        engine.start(StartOptions::default()).await.unwrap();

        let began = Instant::now();
        let stop = engine.stop(StopOptions::default()).await;
        assert_eq!(stop.order, vec!["slow"]);
        assert!(
            began.elapsed() < Duration::from_millis(350),
            "stop exceeded the teardown deadline: {:?}",
            began.elapsed()
        );
        assert_eq!(engine.stats().workers, 0);
        assert!(!engine.registry().has("slow"));
    }

    #[tokio::test]
    async fn dry_run_resolves_and_renders_without_side_effects() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(AtomicUsize::new(0));
        let engine = new_engine(ModuleRegistry::new());
        engine
            .register_definition(logger_type(Arc::clone(&trace), infos))
            .unwrap();
        engine
            .register_plugin(PluginInstance::new("sys-logger", "L"))
            .unwrap();

        let report = engine.start(StartOptions { dry_run: true }).await.unwrap();
        assert_eq!(report.order, vec!["sys-logger"]);
        let diagram = report.diagram.expect("dry run renders the diagram");
        assert!(diagram.contains("sys-logger (L) [main]"));
        assert!(trace.lock().is_empty());
        assert!(engine.registry().is_empty());

        // A dry run does not seal the instance store.
        engine
            .register_plugin(PluginInstance::new("late", "L"))
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_config_aborts_and_rolls_back_started_instances() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(AtomicUsize::new(0));
        let strict = PluginType::builder("strict")
            .config_schema(RequiredKeys::new(["url"]))
            .build();

        let engine = new_engine(ModuleRegistry::new());
        engine
            .register_definition(logger_type(Arc::clone(&trace), infos))
            .unwrap();
        engine.register_definition(strict).unwrap();
        engine
            .register_plugin(PluginInstance::new("sys-logger", "L"))
            .unwrap();
        engine
            .register_plugin(PluginInstance::new("bad", "strict").with_config(json!({})))
            .unwrap();

        let err = engine.start(StartOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::ConfigInvalid { ref instance, .. } if instance == "bad"
        ));
        // The logger came up first and was torn down again.
        assert_eq!(
            *trace.lock(),
            vec!["setup:sys-logger", "teardown:sys-logger"]
        );
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn worker_without_entry_point_fails_the_spawn() {
        let engine = new_engine(ModuleRegistry::new());
        engine
            .register_definition(PluginType::builder("T").build())
            .unwrap();
        engine
            .register_plugin(PluginInstance::new("w", "T").with_mode(ExecutionMode::Worker))
            .unwrap();

        let err = engine.start(StartOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::WorkerSpawnFailed { ref instance, .. } if instance == "w"
        ));
    }

    #[tokio::test]
    async fn instances_are_sealed_once_start_begins() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(AtomicUsize::new(0));
        let engine = new_engine(ModuleRegistry::new());
        engine
            .register_definition(logger_type(trace, infos))
            .unwrap();
        engine
            .register_plugin(PluginInstance::new("sys-logger", "L"))
            .unwrap();
        engine.start(StartOptions::default()).await.unwrap();

        assert!(matches!(
            engine
                .register_plugin(PluginInstance::new("late", "L"))
                .unwrap_err(),
            RegistryError::InstancesSealed
        ));
        engine.stop(StopOptions::default()).await;
    }

    #[tokio::test]
    async fn unknown_type_is_rejected_at_instance_registration() {
        let engine = new_engine(ModuleRegistry::new());
        let err = engine
            .register_plugin(PluginInstance::new("x", "ghost"))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnknownType { instance, type_id }
                if instance == "x" && type_id == "ghost"
        ));
    }

    #[tokio::test]
    async fn stats_display_reads_naturally() {
        let engine = new_engine(ModuleRegistry::new());
        let stats = engine.stats();
        assert_eq!(
            stats.to_string(),
            "0 type(s), 0 instance(s), 0 service(s), 0 worker(s), stopped"
        );
    }
}
