//! The module registry — resolving entry points to plugin types.
//!
//! Worker bundles carry an opaque entry-point string rather than code; the
//! host program resolves it here, in a table built up front mapping each
//! entry point to the plugin types that module exports. The
//! [`TaskSpawner`](crate::spawner::TaskSpawner) resolves bundles against
//! this table before a worker task is created, so a dangling entry point
//! fails the spawn — and with it, startup.

use std::collections::HashMap;
use std::sync::Arc;

use lattice_core::plugin::PluginType;

/// Entry-point string → exported plugin types.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<Vec<PluginType>>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the exports of one module under `entry_point`.
    /// A repeated entry point replaces the previous exports.
    pub fn register_module<I>(&mut self, entry_point: impl Into<String>, exports: I)
    where
        I: IntoIterator<Item = PluginType>,
    {
        self.modules
            .insert(entry_point.into(), Arc::new(exports.into_iter().collect()));
    }

    /// Builder-style [`register_module`](Self::register_module).
    pub fn with_module<I>(mut self, entry_point: impl Into<String>, exports: I) -> Self
    where
        I: IntoIterator<Item = PluginType>,
    {
        self.register_module(entry_point, exports);
        self
    }

    /// Resolves an entry point to its exports.
    pub fn resolve(&self, entry_point: &str) -> Option<Arc<Vec<PluginType>>> {
        self.modules.get(entry_point).cloned()
    }

    /// Locates the export with the given type id under `entry_point`.
    pub fn resolve_type(&self, entry_point: &str, type_id: &str) -> Option<PluginType> {
        self.resolve(entry_point)?
            .iter()
            .find(|t| t.id() == type_id)
            .cloned()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
