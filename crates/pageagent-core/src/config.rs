//! Agent configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists or it fails to parse.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name this agent reports in logs (the injection context).
    pub context: String,
    /// WebSocket URL of the controller.
    pub controller_url: String,
    /// The single key a parent-frame handshake message may carry.
    pub handshake_key: String,
    /// Name of the module the agent registers for itself.
    pub builtin_module: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            context: "page".into(),
            controller_url: "ws://127.0.0.1:17321/agent".into(),
            handshake_key: "frameToken".into(),
            builtin_module: "agent".into(),
        }
    }
}

impl AgentConfig {
    /// Load config from a TOML file. Missing or malformed files yield defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Strict variant of [`load`](Self::load): parse errors are returned.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::ConfigError(e.to_string()))
    }

    /// Render the config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
