//! Configuration management for summary-speaker.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so an empty or missing file yields a runnable service (apart
//! from the Gemini API key, which must come from the file or environment).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable consulted when `summarizer.api_key` is empty.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY not found. Set it in the environment, a .env file, or summarizer.api_key")]
    MissingApiKey,
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

/// Longest sweep interval accepted. Larger values would overflow timer math.
const MAX_INTERVAL_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Expose error details in 500 responses.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub api_key: String,
    pub base_url: String,
    pub summary_model: String,
    pub keyword_model: String,
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            summary_model: "gemini-2.5-pro".into(),
            keyword_model: "gemini-2.5-flash".into(),
            timeout_secs: 60,
        }
    }
}

impl SummarizerConfig {
    /// Pick the configured key, falling back to the environment value.
    pub fn resolve_api_key(&self, env_value: Option<String>) -> Result<String, ConfigError> {
        let configured = self.api_key.trim();
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        env_value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub base_url: String,
    pub lang: String,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://translate.google.com".into(),
            lang: "en".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub dir: PathBuf,
    /// Prefix of the suggested filename on download.
    pub download_prefix: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("static/audio"),
            download_prefix: "speech_audio".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            max_age_secs: 3600,
        }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_secs(self.interval_secs.clamp(1, MAX_INTERVAL_SECS))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResultsLogConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub summarizer: SummarizerConfig,
    pub speech: SpeechConfig,
    pub audio: AudioConfig,
    pub retention: RetentionConfig,
    pub results_log: ResultsLogConfig,
}

impl Config {
    /// Load configuration, falling back to defaults on any problem.
    ///
    /// Uses `path` if given, otherwise the first of [`search_paths`](Self::search_paths)
    /// that exists.
    pub fn load(path: Option<&Path>) -> Self {
        let found = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.exists()),
        };
        let Some(config_path) = found else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        Self::from_file(&config_path).unwrap_or_else(|e| {
            warn!("{e}, using defaults");
            Self::default()
        })
    }

    /// Candidate config files, in priority order:
    /// 1. ./config.yaml
    /// 2. ~/.config/summary-speaker/config.yaml
    /// 3. /etc/summary-speaker/config.yaml
    pub fn search_paths() -> Vec<PathBuf> {
        [
            std::env::current_dir().ok().map(|d| d.join("config.yaml")),
            dirs::home_dir().map(|h| h.join(".config/summary-speaker/config.yaml")),
            Some(PathBuf::from("/etc/summary-speaker/config.yaml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }

    /// Results log location, or `None` when the log is disabled.
    pub fn results_log_path(&self) -> Option<PathBuf> {
        if !self.results_log.enabled {
            return None;
        }
        Some(
            self.results_log
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from("summary-results.jsonl")),
        )
    }
}
