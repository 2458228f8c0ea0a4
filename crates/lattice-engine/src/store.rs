//! Definition and instance stores.
//!
//! The stores own identity and lock state, nothing else: they never
//! introspect setup/teardown hooks. A [`DefinitionStore`] locks monotonically
//! — once locked it refuses further type registrations for the life of the
//! process. An [`InstanceStore`] preserves registration order (the resolver's
//! iteration order, and with it the determinism guarantee) and seals itself
//! when `start()` begins.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::info;

use lattice_core::error::{RegistryError, RegistryResult};
use lattice_core::plugin::{PluginInstance, PluginType};

// =============================================================================
// DefinitionStore
// =============================================================================

/// Holds registered plugin types and the lock flag.
#[derive(Default)]
pub struct DefinitionStore {
    types: RwLock<HashMap<String, Arc<PluginType>>>,
    locked: AtomicBool,
}

impl DefinitionStore {
    /// Creates an empty, unlocked store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin type.
    pub fn register(&self, plugin_type: PluginType) -> RegistryResult<()> {
        if self.locked.load(Ordering::SeqCst) {
            return Err(RegistryError::Locked);
        }
        let mut types = self.types.write();
        if types.contains_key(plugin_type.id()) {
            return Err(RegistryError::DuplicateType(plugin_type.id().to_string()));
        }
        info!(plugin_type = %plugin_type.id(), "Plugin type registered");
        types.insert(plugin_type.id().to_string(), Arc::new(plugin_type));
        Ok(())
    }

    /// Locks the store. Idempotent; once set, never cleared.
    pub fn lock(&self) {
        if !self.locked.swap(true, Ordering::SeqCst) {
            info!("Definition store locked");
        }
    }

    /// Whether the store is locked.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Fetches a type by id.
    pub fn get(&self, id: &str) -> Option<Arc<PluginType>> {
        self.types.read().get(id).cloned()
    }

    /// Whether a type with `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.types.read().contains_key(id)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

// =============================================================================
// InstanceStore
// =============================================================================

/// Holds registered plugin instances in registration order.
#[derive(Default)]
pub struct InstanceStore {
    instances: RwLock<Vec<Arc<PluginInstance>>>,
    sealed: AtomicBool,
}

impl InstanceStore {
    /// Creates an empty, unsealed store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance. Refused once the store is sealed.
    pub fn register(&self, instance: PluginInstance) -> RegistryResult<()> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RegistryError::InstancesSealed);
        }
        let mut instances = self.instances.write();
        if instances.iter().any(|i| i.id() == instance.id()) {
            return Err(RegistryError::DuplicateInstance(instance.id().to_string()));
        }
        info!(instance = %instance.id(), plugin_type = %instance.type_id(), "Plugin instance registered");
        instances.push(Arc::new(instance));
        Ok(())
    }

    /// Seals the store; called when `start()` begins. Never cleared.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    /// Whether the store is sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Fetches an instance by id.
    pub fn get(&self, id: &str) -> Option<Arc<PluginInstance>> {
        self.instances.read().iter().find(|i| i.id() == id).cloned()
    }

    /// Whether an instance with `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.instances.read().iter().any(|i| i.id() == id)
    }

    /// Point-in-time copy of all instances, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<PluginInstance>> {
        self.instances.read().clone()
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Whether no instances are registered.
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::plugin::PluginType;

    fn leaf_type(id: &str) -> PluginType {
        PluginType::builder(id).build()
    }

    #[test]
    fn duplicate_type_fails() {
        let store = DefinitionStore::new();
        store.register(leaf_type("L")).unwrap();
        assert!(matches!(
            store.register(leaf_type("L")).unwrap_err(),
            RegistryError::DuplicateType(id) if id == "L"
        ));
    }

    #[test]
    fn lock_is_monotone() {
        let store = DefinitionStore::new();
        store.register(leaf_type("A")).unwrap();
        store.lock();
        store.lock(); // idempotent
        assert!(store.is_locked());
        assert!(matches!(
            store.register(leaf_type("B")).unwrap_err(),
            RegistryError::Locked
        ));
        // The earlier registration is unaffected.
        assert!(store.contains("A"));
    }

    #[test]
    fn duplicate_instance_fails() {
        let store = InstanceStore::new();
        store.register(PluginInstance::new("x", "T")).unwrap();
        assert!(matches!(
            store.register(PluginInstance::new("x", "T")).unwrap_err(),
            RegistryError::DuplicateInstance(id) if id == "x"
        ));
    }

    #[test]
    fn sealed_store_refuses_registration() {
        let store = InstanceStore::new();
        store.register(PluginInstance::new("x", "T")).unwrap();
        store.seal();
        assert!(matches!(
            store.register(PluginInstance::new("y", "T")).unwrap_err(),
            RegistryError::InstancesSealed
        ));
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let store = InstanceStore::new();
        store.register(PluginInstance::new("b", "T")).unwrap();
        store.register(PluginInstance::new("a", "T")).unwrap();
        let order: Vec<_> = store.snapshot().iter().map(|i| i.id().to_string()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
