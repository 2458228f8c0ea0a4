//! The service registry — `instance id → service value`.
//!
//! All mutation happens on the engine's control path (start and stop);
//! uplink servers and setup hooks only read. During startup the map grows
//! monotonically; between a completed `start()` and the matching `stop()` it
//! is effectively read-only.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use lattice_core::error::{RegistryError, RegistryResult};
use lattice_core::schema::{ContractHandle, ServiceContract};
use lattice_core::service::{ServiceArc, ServiceLookup};

/// Id-keyed map of published services with optional contract validation at
/// registration.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceArc>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `service` under `id`.
    ///
    /// Fails with [`RegistryError::DuplicateService`] when the id is taken.
    /// When `contract` is supplied the value is validated first and a
    /// rejection fails with [`RegistryError::ContractViolation`]. Worker
    /// proxies are registered without a contract — they are ghost objects
    /// whose method shapes cannot be introspected.
    pub fn register(
        &self,
        id: &str,
        contract: Option<&ContractHandle>,
        service: ServiceArc,
    ) -> RegistryResult<()> {
        if let Some(contract) = contract {
            contract
                .validate(service.as_ref())
                .map_err(|e| RegistryError::ContractViolation {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let mut services = self.services.write();
        if services.contains_key(id) {
            return Err(RegistryError::DuplicateService(id.to_string()));
        }
        services.insert(id.to_string(), service);
        debug!(service = %id, "Service registered");
        Ok(())
    }

    /// Fetches the service published under `id`.
    pub fn get(&self, id: &str) -> RegistryResult<ServiceArc> {
        self.services
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownService(id.to_string()))
    }

    /// Whether a service is published under `id`.
    pub fn has(&self, id: &str) -> bool {
        self.services.read().contains_key(id)
    }

    /// Retracts the service under `id`. Engine control path only; used at
    /// stop to withdraw the services published during start.
    pub fn remove(&self, id: &str) -> Option<ServiceArc> {
        let removed = self.services.write().remove(id);
        if removed.is_some() {
            debug!(service = %id, "Service retracted");
        }
        removed
    }

    /// Point-in-time list of published ids, sorted for stable output.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.services.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of published services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Whether no services are published.
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl ServiceLookup for ServiceRegistry {
    fn lookup(&self, instance_id: &str) -> RegistryResult<ServiceArc> {
        self.get(instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::schema::MethodSet;
    use lattice_core::service::FnService;
    use serde_json::json;

    fn ping_service() -> ServiceArc {
        FnService::new()
            .method("ping", |_| async { Ok(json!("pong")) })
            .into_arc()
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = ServiceRegistry::new();
        registry.register("svc", None, ping_service()).unwrap();
        let err = registry.register("svc", None, ping_service()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateService(id) if id == "svc"));
    }

    #[test]
    fn unknown_lookup_fails() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.get("nope").unwrap_err(),
            RegistryError::UnknownService(id) if id == "nope"
        ));
        assert!(!registry.has("nope"));
    }

    #[test]
    fn contract_is_enforced_when_supplied() {
        let registry = ServiceRegistry::new();
        let contract = MethodSet::new(["ping"]);
        registry
            .register("ok", Some(&contract), ping_service())
            .unwrap();

        let strict = MethodSet::new(["query"]);
        let err = registry
            .register("bad", Some(&strict), ping_service())
            .unwrap_err();
        assert!(matches!(err, RegistryError::ContractViolation { id, .. } if id == "bad"));
        assert!(!registry.has("bad"));
    }

    #[test]
    fn remove_retracts_service() {
        let registry = ServiceRegistry::new();
        registry.register("svc", None, ping_service()).unwrap();
        assert!(registry.remove("svc").is_some());
        assert!(!registry.has("svc"));
        assert!(registry.remove("svc").is_none());
    }

    #[test]
    fn ids_are_sorted() {
        let registry = ServiceRegistry::new();
        registry.register("b", None, ping_service()).unwrap();
        registry.register("a", None, ping_service()).unwrap();
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
