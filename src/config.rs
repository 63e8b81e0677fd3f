//! Configuration loading.
//!
//! Layering follows the teacher's pattern: built-in defaults, then a TOML
//! file if present, then environment variable overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default HTTP port for the JSON facade.
pub const DEFAULT_HTTP_PORT: u16 = 7437;
/// Default cap on observation/prompt content length.
pub const DEFAULT_MAX_OBSERVATION_LENGTH: usize = 2000;
/// Default cap on the number of items `format_context` includes per section.
pub const DEFAULT_MAX_CONTEXT_RESULTS: usize = 20;
/// Hard cap on the number of rows any search call can return.
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 20;

/// Runtime configuration for the Engram engine and its facades.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngramConfig {
    /// Directory holding `engram.db` and the sync directory.
    pub data_dir: PathBuf,
    /// Port the HTTP facade listens on.
    pub http_port: u16,
    /// Maximum stored length of observation/prompt content before truncation.
    pub max_observation_length: usize,
    /// Maximum number of items per section in `format_context`.
    pub max_context_results: usize,
    /// Hard cap on search result counts.
    pub max_search_results: usize,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            http_port: DEFAULT_HTTP_PORT,
            max_observation_length: DEFAULT_MAX_OBSERVATION_LENGTH,
            max_context_results: DEFAULT_MAX_CONTEXT_RESULTS,
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".engram-data"),
        |dirs| dirs.home_dir().join(".engram"),
    )
}

impl EngramConfig {
    /// Path to the `SQLite` database file inside `data_dir`.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("engram.db")
    }

    /// Loads configuration, optionally reading a TOML file, then applying
    /// environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load(config_path: Option<&std::path::Path>) -> crate::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match config_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content).map_err(|e| crate::Error::InvalidInput(e.to_string()))?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("ENGRAM_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("ENGRAM_HTTP_PORT") {
            if let Ok(port) = port.parse() {
                self.http_port = port;
            }
        }
        if let Ok(len) = std::env::var("ENGRAM_MAX_OBSERVATION_LENGTH") {
            if let Ok(len) = len.parse() {
                self.max_observation_length = len;
            }
        }
        if let Ok(n) = std::env::var("ENGRAM_MAX_CONTEXT_RESULTS") {
            if let Ok(n) = n.parse() {
                self.max_context_results = n;
            }
        }
        if let Ok(n) = std::env::var("ENGRAM_MAX_SEARCH_RESULTS") {
            if let Ok(n) = n.parse() {
                self.max_search_results = n;
            }
        }
    }
}
