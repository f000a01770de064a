use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::source::locators::{maven, npm, pypi};

// =============================================================================
// HTTP-related constants
// =============================================================================

/// Timeout for registry requests in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// User-Agent sent to registries
pub const DEFAULT_USER_AGENT: &str = "vex-collector";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Collector configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectorConfig {
    pub http: HttpConfig,
    pub registries: RegistriesConfig,
    pub log: LogConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Registry base URLs
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistriesConfig {
    pub npm: String,
    pub pypi: String,
    pub maven: String,
    /// OCI registries reached over plain HTTP
    pub insecure: Vec<String>,
}

impl Default for RegistriesConfig {
    fn default() -> Self {
        Self {
            npm: npm::DEFAULT_BASE_URL.to_string(),
            pypi: pypi::DEFAULT_PYPI_REGISTRY.to_string(),
            maven: maven::DEFAULT_BASE_URL.to_string(),
            insecure: Vec::new(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Writes logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl CollectorConfig {
    /// Loads configuration from a JSON file, or defaults when `path` is None
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the HTTP client shared by every registry
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .user_agent(&self.http.user_agent)
            .build()
    }
}

/// Returns the path to the data directory for vex-collector.
/// Uses $XDG_DATA_HOME/vex-collector if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/vex-collector,
/// or ./vex-collector if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the directory for rolling log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("vex-collector")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn collector_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<CollectorConfig>(json!({
            "http": {
                "timeoutSecs": 5
            }
        }))
        .unwrap();

        assert_eq!(result.http.timeout_secs, 5);
        assert_eq!(result.http.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(result.registries, RegistriesConfig::default());
        assert_eq!(result.log, LogConfig::default());
    }

    #[test]
    fn collector_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<CollectorConfig>(json!({
            "http": {
                "timeoutSecs": 10,
                "userAgent": "mirror-bot"
            },
            "registries": {
                "npm": "https://npm.internal",
                "pypi": "https://pypi.internal",
                "maven": "https://maven.internal/releases",
                "insecure": ["registry.local:5000"]
            },
            "log": {
                "format": "json",
                "file": "/var/log/vex-collector.log"
            }
        }))
        .unwrap();

        assert_eq!(
            result,
            CollectorConfig {
                http: HttpConfig {
                    timeout_secs: 10,
                    user_agent: "mirror-bot".to_string(),
                },
                registries: RegistriesConfig {
                    npm: "https://npm.internal".to_string(),
                    pypi: "https://pypi.internal".to_string(),
                    maven: "https://maven.internal/releases".to_string(),
                    insecure: vec!["registry.local:5000".to_string()],
                },
                log: LogConfig {
                    format: LogFormat::Json,
                    file: Some(PathBuf::from("/var/log/vex-collector.log")),
                },
            }
        );
    }

    #[test]
    fn load_without_path_returns_defaults() {
        assert_eq!(CollectorConfig::load(None).unwrap(), CollectorConfig::default());
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = CollectorConfig::load(Some(&path));

        assert!(matches!(result, Err(ConfigError::Parse { path: p, .. }) if p == path));
    }

    #[test]
    fn http_client_builds_from_defaults() {
        assert!(CollectorConfig::default().http_client().is_ok());
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/vex-collector"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/vex-collector"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./vex-collector"));
    }
}
