use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{InookeyError, Result};

/// Top-level configuration for the Inookey backend.
///
/// Loaded from `~/.inookey/config.toml` by default. Every field has a default
/// so a partial (or empty) file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InookeyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

impl InookeyConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: InookeyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| InookeyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply the environment variables the deployment scripts already set:
    /// `OLLAMA_HOST`, `OLLAMA_MODEL`, `PORT` and `FRONTEND_URL`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// injectable lookup, so tests do not touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST").filter(|v| !v.is_empty()) {
            self.ollama.host = host;
        }
        if let Some(model) = lookup("OLLAMA_MODEL").filter(|v| !v.is_empty()) {
            self.ollama.model = model;
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("FRONTEND_URL").filter(|v| !v.is_empty()) {
            self.server.frontend_url = url;
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.inookey/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP / WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Origin allowed by CORS (the marketing site front end).
    pub frontend_url: String,
    /// Maximum accepted request body, in bytes.
    pub body_limit_bytes: usize,
    /// Requests allowed per client in one rate-limit window.
    pub rate_limit_max_requests: u64,
    /// Length of the rate-limit window in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            frontend_url: "http://localhost:3000".to_string(),
            body_limit_bytes: 10 * 1024 * 1024,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 15 * 60,
        }
    }
}

/// Language model service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    pub host: String,
    /// Model identifier used for chat completions.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// Maximum number of tokens generated per reply.
    pub max_tokens: u32,
    /// Timeout for a single chat completion, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for pulling a missing model at startup, in seconds.
    pub pull_timeout_secs: u64,
    /// Pull the configured model when the server does not have it.
    pub pull_missing_model: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 500,
            request_timeout_secs: 60,
            pull_timeout_secs: 3600,
            pull_missing_model: true,
        }
    }
}

/// Chat pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of trailing history turns forwarded to the model.
    pub history_window: usize,
    /// Default number of turns returned by the history endpoint.
    pub history_limit: u32,
    /// Replaces the built-in receptionist persona when set.
    pub persona: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: 5,
            history_limit: 20,
            persona: None,
        }
    }
}

/// WebSocket connection housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Seconds between inactivity sweeps.
    pub sweep_interval_secs: u64,
    /// Connections idle for longer than this many seconds are closed.
    pub inactivity_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            inactivity_timeout_secs: 5 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = InookeyConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.frontend_url, "http://localhost:3000");
        assert_eq!(config.ollama.host, "http://127.0.0.1:11434");
        assert_eq!(config.ollama.model, "llama3.1:8b");
        assert!((config.ollama.temperature - 0.7).abs() < f64::EPSILON);
        assert!((config.ollama.top_p - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.ollama.max_tokens, 500);
        assert_eq!(config.chat.history_window, 5);
        assert_eq!(config.chat.history_limit, 20);
        assert!(config.chat.persona.is_none());
        assert_eq!(config.websocket.sweep_interval_secs, 60);
        assert_eq!(config.websocket.inactivity_timeout_secs, 300);
        assert_eq!(config.server.rate_limit_max_requests, 100);
        assert_eq!(config.server.rate_limit_window_secs, 900);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[ollama]
model = "mistral:7b"
temperature = 0.2

[websocket]
inactivity_timeout_secs = 120
"#;
        let file = create_temp_config(content);
        let config = InookeyConfig::load(file.path()).unwrap();
        assert_eq!(config.ollama.model, "mistral:7b");
        assert!((config.ollama.temperature - 0.2).abs() < f64::EPSILON);
        // Untouched fields keep their defaults.
        assert!((config.ollama.top_p - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.websocket.inactivity_timeout_secs, 120);
        assert_eq!(config.websocket.sweep_interval_secs, 60);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = InookeyConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.inookey/data");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(InookeyConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = InookeyConfig::default();
        config.chat.persona = Some("You are a test persona.".to_string());
        config.save(&path).unwrap();

        let reloaded = InookeyConfig::load(&path).unwrap();
        assert_eq!(
            reloaded.chat.persona.as_deref(),
            Some("You are a test persona.")
        );
        assert_eq!(reloaded.ollama.model, config.ollama.model);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("OLLAMA_MODEL", "qwen2:7b"),
            ("PORT", "8080"),
            ("FRONTEND_URL", "https://inookey.example"),
        ]
        .into_iter()
        .collect();

        let mut config = InookeyConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.ollama.host, "http://gpu-box:11434");
        assert_eq!(config.ollama.model, "qwen2:7b");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.frontend_url, "https://inookey.example");
    }

    #[test]
    fn test_env_overrides_ignore_bad_port_and_empty_values() {
        let mut config = InookeyConfig::default();
        config.apply_overrides(|key| match key {
            "PORT" => Some("not-a-port".to_string()),
            "OLLAMA_MODEL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.ollama.model, "llama3.1:8b");
    }
}
