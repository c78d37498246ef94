//! Client configuration
//!
//! Persisted as a JSON document at a fixed path. Absent or corrupt storage
//! silently falls back to built-in defaults; the file is only written by
//! an explicit save action.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "speedmark.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the traffic server (required to start a session).
    pub server_base_url: String,

    /// Credential broker URL. When unset, the packet-loss phase is
    /// skipped entirely.
    pub turn_credential_url: Option<String>,

    pub enable_packet_loss: bool,
    pub enable_loaded_latency: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_base_url: String::new(),
            turn_credential_url: None,
            enable_packet_loss: true,
            enable_loaded_latency: true,
        }
    }
}

impl Config {
    /// Load from the given path, falling back to defaults when the file
    /// is missing or unparsable. Never a user-visible error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring corrupt config {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Explicit save action.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_or_default("/nonexistent/speedmark.json");
        assert!(config.server_base_url.is_empty());
        assert!(config.enable_packet_loss);
        assert!(config.enable_loaded_latency);
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join("speedmark-corrupt-test.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = Config::load_or_default(&path);
        assert!(config.server_base_url.is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir();
        let path = dir.join("speedmark-roundtrip-test.json");
        let config = Config {
            server_base_url: "https://speed.example".to_string(),
            turn_credential_url: Some("https://turn.example/turn-credentials".to_string()),
            enable_packet_loss: false,
            enable_loaded_latency: true,
        };
        config.save(&path).unwrap();
        let loaded = Config::load_or_default(&path);
        assert_eq!(loaded.server_base_url, "https://speed.example");
        assert!(!loaded.enable_packet_loss);
        let _ = std::fs::remove_file(&path);
    }
}
