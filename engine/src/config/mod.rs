//! Configuration management
//!
//! Lodestar configuration lives in TOML at `~/.lodestar/config.toml`. Every
//! section has defaults, so a partial file (or none at all) is valid.
//!
//! # Configuration Sections
//!
//! - **core**: log level, data directory
//! - **planner**: search depth bound
//! - **executor**: retries, step cap, suspension lifetime, concurrency
//! - **storage**: where suspended sessions are kept (`memory` or `sqlite`)
//! - **capabilities**: tool groups available to actions (`web = true`)
//! - **llm**: default model and the OpenAI-compatible endpoint
//! - **star_news**: settings for the star news agent
//!
//! # Examples
//!
//! ```no_run
//! use lodestar_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Max attempts: {}", config.executor.max_attempts);
//! # Ok(())
//! # }
//! ```

use crate::capability::StaticCapabilities;
use crate::executor::ExecutorSettings;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Tool group name -> available
    #[serde(default)]
    pub capabilities: BTreeMap<String, bool>,

    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub star_news: StarNewsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Deepest chain of sub-goals the planner will follow
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Total attempts for an action failing recoverably
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Executed steps allowed per session
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_suspension_ttl_secs")]
    pub suspension_ttl_secs: u64,

    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
}

/// Suspension store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite file; relative paths resolve against `core.data_dir`
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

/// LLM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Model used when an action asks for automatic selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// OpenAI-compatible endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key; keys never live in config
    #[serde(default = "default_openai_api_key_env")]
    pub api_key_env: String,

    /// Models served by this endpoint
    #[serde(default = "default_openai_models")]
    pub models: Vec<String>,
}

/// Star news agent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarNewsConfig {
    /// Stories to look for
    #[serde(default = "default_story_count")]
    pub story_count: usize,

    /// Target length of the writeup
    #[serde(default = "default_word_count")]
    pub word_count: usize,

    /// Model for news search and the writeup
    #[serde(default = "default_star_news_model")]
    pub model: String,

    #[serde(default = "default_horoscope_base_url")]
    pub horoscope_base_url: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.lodestar/data")
}

fn default_max_depth() -> usize {
    crate::planner::DEFAULT_MAX_DEPTH
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_steps() -> usize {
    64
}

fn default_suspension_ttl_secs() -> u64 {
    crate::suspension::DEFAULT_SUSPENSION_TTL_SECS
}

fn default_max_concurrent_sessions() -> usize {
    8
}

fn default_database() -> PathBuf {
    PathBuf::from("lodestar.db")
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_models() -> Vec<String> {
    vec!["gpt-4.1-mini".to_string(), "gpt-4.1".to_string()]
}

fn default_story_count() -> usize {
    5
}

fn default_word_count() -> usize {
    100
}

fn default_star_news_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_horoscope_base_url() -> String {
    "https://horoscope-app-api.vercel.app".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_steps: default_max_steps(),
            suspension_ttl_secs: default_suspension_ttl_secs(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database: default_database(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            timeout_secs: default_llm_timeout_secs(),
            openai: OpenAIConfig::default(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key_env: default_openai_api_key_env(),
            models: default_openai_models(),
        }
    }
}

impl Default for StarNewsConfig {
    fn default() -> Self {
        Self {
            story_count: default_story_count(),
            word_count: default_word_count(),
            model: default_star_news_model(),
            horoscope_base_url: default_horoscope_base_url(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.lodestar/config.toml`, creating it with
    /// defaults if missing
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if the file cannot be read, parsed or
    /// validated.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn save_to_path(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))
    }

    fn create_default(path: &Path) -> Result<Self, EngineError> {
        let default = Self::default();
        default.save_to_path(path)?;

        let mut config = default;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.lodestar/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".lodestar").join("config.toml"))
    }

    /// Validate settings, expand `~` in paths and create the data directory
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let positive = [
            ("planner.max_depth", self.planner.max_depth),
            ("executor.max_steps", self.executor.max_steps),
            (
                "executor.max_concurrent_sessions",
                self.executor.max_concurrent_sessions,
            ),
            ("star_news.story_count", self.star_news.story_count),
            ("star_news.word_count", self.star_news.word_count),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(EngineError::Config(format!("{} must be at least 1", key)));
            }
        }

        if self.executor.max_attempts == 0 {
            return Err(EngineError::Config(
                "executor.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.executor.suspension_ttl_secs == 0 {
            return Err(EngineError::Config(
                "executor.suspension_ttl_secs must be at least 1".to_string(),
            ));
        }

        for (key, url) in [
            ("llm.openai.base_url", &self.llm.openai.base_url),
            ("star_news.horoscope_base_url", &self.star_news.horoscope_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(EngineError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    key, url
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.storage.database = expand_path(&self.storage.database)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// SQLite file path with relative paths resolved against the data dir
    pub fn database_path(&self) -> PathBuf {
        if self.storage.database.is_absolute() {
            self.storage.database.clone()
        } else {
            self.core.data_dir.join(&self.storage.database)
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_attempts: self.executor.max_attempts,
            retry_backoff: Duration::from_millis(self.executor.retry_backoff_ms),
            max_steps: self.executor.max_steps,
            suspension_ttl: Duration::from_secs(self.executor.suspension_ttl_secs),
        }
    }

    pub fn capability_resolver(&self) -> StaticCapabilities {
        StaticCapabilities::from_table(&self.capabilities)
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityResolver;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.executor.max_attempts, 3);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.star_news.story_count, 5);
        assert_eq!(config.star_news.word_count, 100);
        assert_eq!(config.star_news.model, "gpt-4.1-mini");
        assert!(config.capabilities.is_empty());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
            [core]
            data_dir = "{}"

            [executor]
            max_attempts = 5

            [capabilities]
            web = true
            browser_automation = false

            [storage]
            backend = "sqlite"
            "#,
            dir.path().join("data").display()
        );

        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.executor.max_attempts, 5);
        assert_eq!(config.executor.max_steps, 64);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.database_path(), dir.path().join("data").join("lodestar.db"));
        assert!(dir.path().join("data").is_dir());

        let caps = config.capability_resolver();
        assert!(caps.is_available("web"));
        assert!(!caps.is_available("browser_automation"));
    }

    #[test]
    fn test_validation_errors() {
        let err = Config::from_toml("[core]\nlog_level = \"loud\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("loud")));

        let err = Config::from_toml("[executor]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("max_attempts")));

        let err = Config::from_toml("[star_news]\nhoroscope_base_url = \"ftp://x\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("horoscope_base_url")));

        let err = Config::from_toml("[storage]\nbackend = \"redis\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_executor_settings() {
        let mut config = Config::default();
        config.executor.retry_backoff_ms = 250;
        let settings = config.executor_settings();
        assert_eq!(settings.retry_backoff, Duration::from_millis(250));
        assert_eq!(settings.max_attempts, 3);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = expand_path(&PathBuf::from("~/test")).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.capabilities.insert("web".to_string(), true);
        config.llm.default_model = Some("gpt-4.1".to_string());

        let toml_string = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config, deserialized);
    }
}
