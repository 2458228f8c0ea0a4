//! Schema and contract capabilities.
//!
//! The runtime never interprets schemas itself; it only relies on two narrow
//! capabilities supplied at type-registration time:
//!
//! - [`ConfigSchema`] — parses and normalizes a raw config value at start.
//! - [`ServiceContract`] — validates the shape of a service value at
//!   registration.
//!
//! A handful of stock implementations cover the common cases; anything more
//! elaborate (full JSON-schema validation, serde-typed configs) plugs in by
//! implementing the traits.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};
use crate::service::Service;

// =============================================================================
// Capabilities
// =============================================================================

/// Validates and normalizes plugin config values.
pub trait ConfigSchema: Send + Sync {
    /// Parses `value`, returning the validated (possibly normalized) value.
    fn parse(&self, value: &Value) -> SchemaResult<Value>;
}

/// Validates the shape of a service value.
pub trait ServiceContract: Send + Sync {
    /// Checks `service` against this contract.
    fn validate(&self, service: &dyn Service) -> SchemaResult<()>;
}

/// Shared handle to a config schema.
pub type SchemaHandle = Arc<dyn ConfigSchema>;

/// Shared handle to a service contract.
pub type ContractHandle = Arc<dyn ServiceContract>;

// =============================================================================
// Stock implementations
// =============================================================================

/// Accepts any config value unchanged, and any service shape.
pub struct AnyValue;

impl ConfigSchema for AnyValue {
    fn parse(&self, value: &Value) -> SchemaResult<Value> {
        Ok(value.clone())
    }
}

impl ServiceContract for AnyValue {
    fn validate(&self, _service: &dyn Service) -> SchemaResult<()> {
        Ok(())
    }
}

impl AnyValue {
    /// Shared schema handle.
    pub fn schema() -> SchemaHandle {
        Arc::new(AnyValue)
    }

    /// Shared contract handle.
    pub fn contract() -> ContractHandle {
        Arc::new(AnyValue)
    }
}

/// Requires the config to be a JSON object containing the given keys.
pub struct RequiredKeys {
    keys: Vec<String>,
}

impl RequiredKeys {
    /// Builds a schema handle requiring `keys`.
    pub fn new<I, S>(keys: I) -> SchemaHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            keys: keys.into_iter().map(Into::into).collect(),
        })
    }
}

impl ConfigSchema for RequiredKeys {
    fn parse(&self, value: &Value) -> SchemaResult<Value> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::Invalid("expected an object".into()))?;
        for key in &self.keys {
            if !obj.contains_key(key) {
                return Err(SchemaError::MissingKey(key.clone()));
            }
        }
        Ok(value.clone())
    }
}

/// Requires the service to expose every listed method.
///
/// Only meaningful against services that can enumerate themselves; worker
/// proxies can't, which is why the engine registers them without a contract.
pub struct MethodSet {
    methods: Vec<String>,
}

impl MethodSet {
    /// Builds a contract handle requiring `methods`.
    pub fn new<I, S>(methods: I) -> ContractHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            methods: methods.into_iter().map(Into::into).collect(),
        })
    }
}

impl ServiceContract for MethodSet {
    fn validate(&self, service: &dyn Service) -> SchemaResult<()> {
        let exposed = service.methods();
        for method in &self.methods {
            if !exposed.contains(method) {
                return Err(SchemaError::MissingMethod(method.clone()));
            }
        }
        Ok(())
    }
}
