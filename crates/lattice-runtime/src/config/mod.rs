//! Configuration loading and validation.

mod error;
mod loader;
mod schema;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{EngineConfig, GlobalConfig, LatticeConfig};
pub use validation::validate_config;
