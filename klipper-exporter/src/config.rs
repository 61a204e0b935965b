//! Configuration for the Klipper exporter.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use klipper_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::{Module, ModuleSet};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Upstream Moonraker settings.
    #[serde(default)]
    pub moonraker: MoonrakerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:9101").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path of the multi-target probe endpoint (default: "/probe").
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Path of the exporter self-metrics endpoint (default: "/metrics").
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

fn default_listen() -> String {
    "0.0.0.0:9101".to_string()
}

fn default_probe_path() -> String {
    "/probe".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            probe_path: default_probe_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

/// Moonraker client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoonrakerConfig {
    /// API key sent when the probe request carries none.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request upstream timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Modules collected when a probe names none.
    #[serde(default = "default_modules")]
    pub default_modules: Vec<String>,
}

fn default_timeout() -> u64 {
    5
}

fn default_modules() -> Vec<String> {
    [Module::ProcessStats, Module::JobQueue, Module::SystemInfo]
        .iter()
        .map(|m| m.as_str().to_string())
        .collect()
}

impl Default for MoonrakerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_secs: default_timeout(),
            default_modules: default_modules(),
        }
    }
}

impl MoonrakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn default_module_set(&self) -> ModuleSet {
        ModuleSet::from_tags(&self.default_modules)
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        for path in [&self.http.probe_path, &self.http.metrics_path] {
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "HTTP path must start with /: {}",
                    path
                )));
            }
        }

        if self.http.probe_path == self.http.metrics_path {
            return Err(ConfigError::Validation(
                "probe_path and metrics_path must differ".to_string(),
            ));
        }

        if self.moonraker.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        if self.moonraker.default_modules.is_empty() {
            return Err(ConfigError::Validation(
                "default_modules must not be empty".to_string(),
            ));
        }

        for tag in &self.moonraker.default_modules {
            tag.parse::<Module>()
                .map_err(|e| ConfigError::Validation(format!("default_modules: {}", e)))?;
        }

        Ok(())
    }

    /// The parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http.listen.parse().map_err(|_| {
            ConfigError::Validation(format!("Invalid listen address: {}", self.http.listen))
        })
    }
}
