//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{EngineConfig, LatticeConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &LatticeConfig) -> ConfigResult<()> {
    validate_global_config(config)?;
    validate_engine_config(&config.engine)?;
    Ok(())
}

/// Validates global configuration settings.
fn validate_global_config(config: &LatticeConfig) -> ConfigResult<()> {
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        return Err(ConfigError::validation(format!(
            "Invalid log level: {}. Valid values are: {:?}",
            config.global.log_level, valid_log_levels
        )));
    }

    Ok(())
}

/// Validates engine timeout settings.
fn validate_engine_config(engine: &EngineConfig) -> ConfigResult<()> {
    if engine.rpc_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "RPC timeout must be greater than 0",
        ));
    }

    if engine.teardown_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Teardown timeout must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = LatticeConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = LatticeConfig::default();
        config.global.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let mut config = LatticeConfig::default();
        config.engine.rpc_timeout_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation(_))
        ));

        let mut config = LatticeConfig::default();
        config.engine.teardown_timeout_ms = 0;
        assert!(validate_config(&config).is_err());
    }
}
