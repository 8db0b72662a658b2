//! Configuration types for the study-assistant client.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend discovery settings.
    pub backend: BackendConfig,
    /// Audio playback settings.
    pub audio: AudioConfig,
    /// Ask-session settings.
    pub session: SessionConfig,
}

/// Backend discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Ordered candidate base URLs, probed first to last.
    pub candidates: Vec<String>,
    /// Health-check path on each candidate.
    pub health_path: String,
    /// Per-candidate probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                "http://localhost:5001".to_owned(),
                "http://localhost:5002".to_owned(),
                "http://127.0.0.1:5001".to_owned(),
            ],
            health_path: "/health".to_owned(),
            probe_timeout_ms: 2_000,
        }
    }
}

/// Audio playback configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

/// Ask-session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether answers also stream synthesized speech.
    pub voice: bool,
    /// Maximum question/answer pairs retained in conversation history.
    /// 0 = unlimited.
    pub max_history_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice: true,
            max_history_turns: 20,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be
    /// serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/lectern/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lectern")
            .join("config.toml")
    }
}
