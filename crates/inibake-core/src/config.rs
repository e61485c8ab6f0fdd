//! Persistent engine configuration.
//!
//! Stored as JSON in `<config dir>/inibake/config.json`. Every field has a
//! default, so a missing or partial file is never an error.
//!
//! # Example
//!
//! ```no_run
//! use inibake_core::config::EngineConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let mut config = EngineConfig::load();
//! config.stop_on_error = true;
//! config.save().expect("cannot write config");
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const CONFIG_FILENAME: &str = "config.json";

/// Returns the inibake configuration directory, creating it if needed.
pub fn inibake_dir() -> PathBuf {
    let dir = dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("inibake");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Tunables for compilation and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest allowed `If`/`Else` nesting inside one section.
    pub max_nesting_depth: usize,

    /// Passes `%name%` expansion may take before it is declared circular.
    pub max_expand_iterations: usize,

    /// Deepest allowed chain of section calls (`Run`, `Exec`, `Loop`, macros).
    pub max_call_depth: usize,

    /// Halt the build on the first Error entry instead of continuing.
    pub stop_on_error: bool,

    /// Timeout for `Ping` branch conditions.
    pub ping_timeout_ms: u64,

    /// Where the CLI writes rolling diagnostic logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_expand_iterations: 32,
            max_call_depth: 256,
            stop_on_error: false,
            ping_timeout_ms: 1000,
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load config from the default location.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        let path = inibake_dir().join(CONFIG_FILENAME);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to the default location.
    pub fn save(&self) -> std::io::Result<()> {
        let path = inibake_dir().join(CONFIG_FILENAME);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Resolved diagnostic log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| inibake_dir().join("logs"))
    }
}
