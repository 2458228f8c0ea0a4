//! Loading `lattice.yaml`.
//!
//! Configuration is optional — the runtime runs on built-in defaults when no
//! file exists, since every knob (engine timeouts, log level) has one.
//! Discovery order:
//!
//! 1. The `LATTICE_CONFIG` environment variable, when set, names the file
//!    directly; a dangling path is then an error rather than a silent
//!    fallback.
//! 2. `lattice.yaml` / `lattice.yml` (and their dotfile variants) in each
//!    search path — by default the working directory, then the user config
//!    directory.
//!
//! Values may reference environment variables as `${NAME}` or
//! `${NAME:-fallback}`; references are expanded before the YAML is parsed,
//! so a timeout can read `rpc_timeout_ms: ${LATTICE_RPC_TIMEOUT_MS:-10000}`.

use std::path::{Path, PathBuf};

use regex_lite::{Captures, Regex};
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::LatticeConfig;
use super::validation::validate_config;

/// Environment variable naming an explicit config file.
const CONFIG_ENV: &str = "LATTICE_CONFIG";

/// File names probed in each search path, in order.
const FILE_NAMES: &[&str] = &["lattice.yaml", "lattice.yml", ".lattice.yaml", ".lattice.yml"];

/// Locates, expands, parses, and validates a [`LatticeConfig`].
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// A loader with no search paths. Useful with explicit files or
    /// strings; [`ConfigLoader::default`] probes the usual locations.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Appends a directory to probe for config files.
    pub fn search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads the first configuration found, falling back to defaults when
    /// none exists.
    pub fn load(&self) -> ConfigResult<LatticeConfig> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            info!(path = %path, "Loading configuration named by {CONFIG_ENV}");
            return self.load_from_file(path);
        }

        match self.find() {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration");
                self.load_from_file(path)
            }
            None => {
                info!("No configuration file found, using defaults");
                Ok(LatticeConfig::default())
            }
        }
    }

    /// Loads and validates a specific file.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> ConfigResult<LatticeConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "Reading configuration file");
        self.load_from_str(&std::fs::read_to_string(path)?)
    }

    /// Parses and validates YAML content. Empty content yields the
    /// defaults.
    pub fn load_from_str(&self, yaml: &str) -> ConfigResult<LatticeConfig> {
        let expanded = expand_env(yaml);
        let config = if expanded.trim().is_empty() {
            LatticeConfig::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        validate_config(&config)?;
        Ok(config)
    }

    /// First existing candidate across the search paths.
    fn find(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }
}

impl Default for ConfigLoader {
    /// Probes the working directory, then the user config directory.
    fn default() -> Self {
        let mut loader = Self::new();
        if let Ok(cwd) = std::env::current_dir() {
            loader = loader.search_path(cwd);
        }
        if let Some(dir) = dirs::config_dir() {
            loader = loader.search_path(dir.join("lattice"));
        }
        loader
    }
}

/// Replaces each `${NAME}` / `${NAME:-fallback}` reference with the named
/// environment variable, the fallback, or the empty string, in that order.
fn expand_env(content: &str) -> String {
    let reference = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap();
    reference
        .replace_all(content, |caps: &Captures| {
            std::env::var(&caps[1])
                .ok()
                .or_else(|| caps.get(2).map(|fallback| fallback.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Convenience function to load configuration from the default locations.
pub fn load_config() -> ConfigResult<LatticeConfig> {
    ConfigLoader::default().load()
}

/// Convenience function to load configuration from a specific file.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<LatticeConfig> {
    ConfigLoader::new().load_from_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_yields_defaults() {
        let config = ConfigLoader::new().load_from_str("").unwrap();
        assert_eq!(config.engine.rpc_timeout_ms, 10_000);
        assert_eq!(config.global.log_level, "info");
    }

    #[test]
    fn sections_override_defaults_independently() {
        let yaml = r#"
global:
  log_level: debug
"#;
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(config.global.log_level, "debug");
        assert_eq!(config.engine.teardown_timeout_ms, 5_000);
    }

    #[test]
    fn engine_timeouts_parse() {
        let yaml = r#"
engine:
  rpc_timeout_ms: 2500
  teardown_timeout_ms: 1000
"#;
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(config.engine.rpc_timeout_ms, 2500);
        assert_eq!(config.engine.teardown_timeout_ms, 1000);
    }

    #[test]
    fn env_references_expand() {
        // SAFETY: This test runs in single-threaded context
        unsafe { std::env::set_var("LATTICE_TEST_LEVEL", "warn") };

        let yaml = r#"
global:
  log_level: ${LATTICE_TEST_LEVEL}
"#;
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(config.global.log_level, "warn");

        // SAFETY: This test runs in single-threaded context
        unsafe { std::env::remove_var("LATTICE_TEST_LEVEL") };
    }

    #[test]
    fn unset_env_reference_takes_the_fallback() {
        let yaml = r#"
engine:
  rpc_timeout_ms: ${LATTICE_NONEXISTENT_TIMEOUT:-1234}
"#;
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(config.engine.rpc_timeout_ms, 1234);
    }

    #[test]
    fn expansion_handles_repeated_references() {
        // SAFETY: This test runs in single-threaded context
        unsafe { std::env::set_var("LATTICE_TEST_MS", "750") };

        let yaml = r#"
engine:
  rpc_timeout_ms: ${LATTICE_TEST_MS}
  teardown_timeout_ms: ${LATTICE_TEST_MS}
"#;
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(config.engine.rpc_timeout_ms, 750);
        assert_eq!(config.engine.teardown_timeout_ms, 750);

        // SAFETY: This test runs in single-threaded context
        unsafe { std::env::remove_var("LATTICE_TEST_MS") };
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::new()
            .load_from_file("/nonexistent/lattice.yaml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
