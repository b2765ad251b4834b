use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Main configuration structure shared by all github-clone-all tools
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// External git tool behavior
    #[serde(default)]
    pub git: GitConfig,

    /// Where working copies are created
    #[serde(default)]
    pub clone: CloneConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// REST API base URL (override for GitHub Enterprise)
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// Total request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Retries after a transport failure
    #[serde(default = "default_http_retries")]
    pub retries: u32,

    /// Initial backoff between retries, doubled on every attempt
    #[serde(default = "default_http_backoff")]
    pub retry_backoff_ms: u64,
}

/// Git tool configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    /// Program used for every git invocation
    #[serde(default = "default_git_program")]
    pub program: String,

    /// Timeout for a single git invocation in seconds
    #[serde(default = "default_git_timeout")]
    pub timeout: u64,

    /// Retries for clone, pull and submodule update
    #[serde(default = "default_git_retries")]
    pub retries: u32,

    /// Initial backoff between retries, doubled on every attempt
    #[serde(default = "default_git_backoff")]
    pub retry_backoff_ms: u64,

    /// Remove a partially cloned directory after a failed clone
    #[serde(default = "default_true")]
    pub cleanup_on_error: bool,

    /// Let git prompt on the terminal for credentials
    #[serde(default)]
    pub interactive: bool,
}

/// Clone destination configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloneConfig {
    /// Directory under which each repository gets its own working copy
    #[serde(default = "default_base_directory")]
    pub base_directory: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_true() -> bool {
    true
}
fn default_http_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_http_retries() -> u32 {
    2
}
fn default_http_backoff() -> u64 {
    500
}
fn default_git_program() -> String {
    "git".to_string()
}
fn default_git_timeout() -> u64 {
    900
}
fn default_git_retries() -> u32 {
    1
}
fn default_git_backoff() -> u64 {
    2000
}
fn default_base_directory() -> String {
    ".".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            connect_timeout: default_connect_timeout(),
            retries: default_http_retries(),
            retry_backoff_ms: default_http_backoff(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            timeout: default_git_timeout(),
            retries: default_git_retries(),
            retry_backoff_ms: default_git_backoff(),
            cleanup_on_error: default_true(),
            interactive: false,
        }
    }
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_backoff_ms))
    }
}

impl GitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_backoff_ms))
    }
}

impl Config {
    /// Load configuration from the default location, falling back to built-in defaults.
    ///
    /// Unlike `save`, this never writes: a missing file simply means defaults.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load from an explicit path when one was given, else the default location
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load_or_default(),
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("github-clone-all").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.clone.base_directory = shellexpand::full(&self.clone.base_directory)
            .context("Failed to expand clone.base_directory path")?
            .into_owned();

        Ok(())
    }

    /// Directory that receives the working copies
    pub fn base_directory(&self) -> PathBuf {
        PathBuf::from(&self.clone.base_directory)
    }

    /// API base URL without a trailing slash
    pub fn api_url(&self) -> &str {
        self.github.api_url.trim_end_matches('/')
    }
}
