//! Configuration for clusterbind.
//!
//! Loaded from `clusterbind.toml`. Every section and field is optional; a
//! missing file means defaults.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [resolver]
//! default_artifact_key = "binding-response"
//! fetch_timeout_ms = 5000
//!
//! [source]
//! snapshot = "/var/lib/clusterbind/snapshot.yaml"
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decoder::DEFAULT_ARTIFACT_KEY;
use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CLUSTERBIND_CONFIG";

/// File name looked up under the platform config directory.
pub const CONFIG_FILE_NAME: &str = "clusterbind.toml";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

/// Artifact resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Artifact key decoded when a request's reference does not name one
    #[serde(default = "default_artifact_key")]
    pub default_artifact_key: String,

    /// Per-fetch timeout; unset means the source decides
    #[serde(default)]
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_artifact_key: default_artifact_key(),
            fetch_timeout_ms: None,
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

fn default_artifact_key() -> String {
    DEFAULT_ARTIFACT_KEY.to_string()
}

/// Where requests, records and artifacts come from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Snapshot document (YAML or JSON by extension)
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Load from the resolved config path, or defaults when there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match resolve_config_path(explicit) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config");
                Self::load_from(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.default_artifact_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "resolver.default_artifact_key must not be empty".to_string(),
            ));
        }
        if self.resolver.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "resolver.fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file to load: explicit path, then `CLUSTERBIND_CONFIG`, then the
/// platform config directory when the file exists there.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_from(explicit, std::env::var_os(CONFIG_ENV), dirs::config_dir())
}

fn resolve_from(
    explicit: Option<&Path>,
    env: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    config_dir
        .map(|dir| dir.join("clusterbind").join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}
