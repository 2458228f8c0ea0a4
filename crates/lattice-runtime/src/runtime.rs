//! Top-level runtime facade.
//!
//! [`LatticeRuntime`] wires the pieces together for the common case: build
//! an [`Orchestrator`] from a [`LatticeConfig`], host workers with the
//! in-process [`TaskSpawner`], initialize logging exactly once, and drive
//! start → wait-for-shutdown → stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tracing::{Level, info};

use lattice_core::error::{LifecycleResult, RegistryResult};
use lattice_core::plugin::{PluginInstance, PluginType};
use lattice_core::spawn::Spawner;
use lattice_engine::{
    EngineStats, Orchestrator, StartOptions, StartReport, StopOptions, StopReport,
};
use lattice_worker::{ModuleRegistry, TaskSpawner};

use crate::config::LatticeConfig;
use crate::logging::{LoggingBuilder, SpanEvents};

/// Global flag to track if logging has been initialized.
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The main Lattice runtime: an [`Orchestrator`] plus configuration and
/// logging plumbing.
///
/// ```rust,ignore
/// let runtime = LatticeRuntime::new(modules);
/// runtime.register_definition(db_type)?;
/// runtime.lock_definitions();
/// runtime.register_plugin(PluginInstance::new("db", "db").with_mode(ExecutionMode::Worker))?;
/// runtime.run().await?;
/// ```
pub struct LatticeRuntime {
    engine: Arc<Orchestrator>,
    config: LatticeConfig,
}

impl LatticeRuntime {
    /// Creates a runtime with default configuration, hosting workers on
    /// in-process tasks resolved from `modules`.
    ///
    /// Initializes logging with default settings (INFO level) on first use.
    pub fn new(modules: ModuleRegistry) -> Self {
        Self::with_config(LatticeConfig::default(), modules)
    }

    /// Creates a runtime from an explicit configuration.
    pub fn with_config(config: LatticeConfig, modules: ModuleRegistry) -> Self {
        let spawner = TaskSpawner::new(modules)
            .with_uplink_timeout(config.engine.rpc_timeout())
            .into_arc();
        Self::with_spawner(config, spawner)
    }

    /// Creates a runtime over a custom [`Spawner`] (subprocesses, threads,
    /// anything implementing the capability).
    pub fn with_spawner(config: LatticeConfig, spawner: Arc<dyn Spawner>) -> Self {
        Self::init_logging(&config.global.log_level);

        let engine = Orchestrator::new(spawner)
            .with_rpc_timeout(config.engine.rpc_timeout())
            .with_teardown_timeout(config.engine.teardown_timeout());

        Self {
            engine: Arc::new(engine),
            config,
        }
    }

    /// Initializes logging once per process, honoring the configured level.
    fn init_logging(level_str: &str) {
        if LOGGING_INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" | "warning" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };

            let span_events = if matches!(level, Level::TRACE | Level::DEBUG) {
                SpanEvents::Lifecycle
            } else {
                SpanEvents::None
            };

            LoggingBuilder::new()
                .level(level)
                .span_events(span_events)
                .init();

            info!(level = %level_str, "Logging initialized");
        }
    }

    /// Returns whether logging has been initialized.
    pub fn is_logging_initialized() -> bool {
        LOGGING_INITIALIZED.load(Ordering::SeqCst)
    }

    /// Manually initializes logging with custom settings.
    ///
    /// Call BEFORE creating a `LatticeRuntime` to take over logging setup.
    pub fn init_logging_custom<F>(init_fn: F)
    where
        F: FnOnce(),
    {
        if LOGGING_INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            init_fn();
        }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<Orchestrator> {
        &self.engine
    }

    /// The active configuration.
    pub fn config(&self) -> &LatticeConfig {
        &self.config
    }

    // ─── Registration passthroughs ───────────────────────────────────────────

    /// Registers a plugin type.
    pub fn register_definition(&self, plugin_type: PluginType) -> RegistryResult<()> {
        self.engine.register_definition(plugin_type)
    }

    /// Locks the type store.
    pub fn lock_definitions(&self) {
        self.engine.lock_definitions();
    }

    /// Registers a plugin instance.
    pub fn register_plugin(&self, instance: PluginInstance) -> RegistryResult<()> {
        self.engine.register_plugin(instance)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Starts all instances.
    pub async fn start(&self, options: StartOptions) -> LifecycleResult<StartReport> {
        self.engine.start(options).await
    }

    /// Stops all started instances.
    pub async fn stop(&self, options: StopOptions) -> StopReport {
        self.engine.stop(options).await
    }

    /// Runs the engine until a shutdown signal is received.
    pub async fn run(&self) -> LifecycleResult<()> {
        self.engine.start(StartOptions::default()).await?;
        info!("Lattice runtime is now running. Press Ctrl+C to stop.");

        Self::wait_for_shutdown().await;

        self.engine.stop(StopOptions::default()).await;
        Ok(())
    }

    /// Runs the engine with a custom shutdown future.
    pub async fn run_until<F>(&self, shutdown: F) -> LifecycleResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.engine.start(StartOptions::default()).await?;

        shutdown.await;

        self.engine.stop(StopOptions::default()).await;
        Ok(())
    }

    /// Waits for shutdown signals (Ctrl+C or SIGTERM).
    async fn wait_for_shutdown() {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to register SIGTERM handler");

            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
            info!("Received Ctrl+C, shutting down");
        }
    }

    /// Returns statistics about the engine.
    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }
}
