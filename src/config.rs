use anyhow::{Context, Result};
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure for starwatch
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub account and API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Persisted snapshot settings
    #[serde(default)]
    pub state: StateConfig,

    /// Email notification settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Run status log settings
    #[serde(default)]
    pub status_log: StatusLogConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Account whose public repositories are watched
    #[serde(default = "default_account")]
    pub account: String,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Page size hint for listing endpoints
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// How the previous run is remembered
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateMode {
    /// Per-repository star count snapshot
    #[default]
    Counts,
    /// Last-checked timestamp; new stars are stargazers since then
    Since,
}

/// State file configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StateConfig {
    #[serde(default)]
    pub mode: StateMode,

    /// Star count snapshot file (counts mode)
    #[serde(default = "default_counts_file")]
    pub counts_file: String,

    /// Last-checked timestamp file (since mode)
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
}

/// Notification transport
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// AWS Simple Email Service
    #[default]
    Ses,
    /// Direct SMTP submission with STARTTLS
    Smtp,
}

/// Notification configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyConfig {
    #[serde(default)]
    pub transport: Transport,

    /// Email subject line
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Environment variable holding the sender address
    #[serde(default = "default_sender_env")]
    pub sender_env: String,

    /// Environment variable holding the receiver address (falls back to sender)
    #[serde(default = "default_receiver_env")]
    pub receiver_env: String,

    /// Environment variable holding the SMTP password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default = "default_ses_region")]
    pub ses_region: String,
}

/// Status log configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatusLogConfig {
    /// Log file location
    #[serde(default = "default_status_log_path")]
    pub path: String,

    /// Maximum number of lines kept
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

/// Configuration problems detected at run start
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
}

// Default value functions
fn default_account() -> String {
    "kimwalisch".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_data_file(name: &str) -> String {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        format!("{}/starwatch/{}", data_home, name)
    } else if let Some(dir) = data_dir() {
        dir.join("starwatch").join(name).to_string_lossy().into_owned()
    } else {
        format!("/tmp/starwatch-{}", name)
    }
}
fn default_counts_file() -> String {
    default_data_file("repo_star_counts.json")
}
fn default_checkpoint_file() -> String {
    default_data_file("last_checked.txt")
}
fn default_subject() -> String {
    "GitHub star notification".to_string()
}
fn default_sender_env() -> String {
    "EMAIL_ADDRESS".to_string()
}
fn default_receiver_env() -> String {
    "EMAIL_RECEIVER".to_string()
}
fn default_password_env() -> String {
    "EMAIL_PASSWORD".to_string()
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_ses_region() -> String {
    "us-east-2".to_string()
}
fn default_status_log_path() -> String {
    "~/status.log".to_string()
}
fn default_max_lines() -> usize {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            account: default_account(),
            api_url: default_api_url(),
            per_page: default_per_page(),
            token_env: default_token_env(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            mode: StateMode::default(),
            counts_file: default_counts_file(),
            checkpoint_file: default_checkpoint_file(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            subject: default_subject(),
            sender_env: default_sender_env(),
            receiver_env: default_receiver_env(),
            password_env: default_password_env(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            ses_region: default_ses_region(),
        }
    }
}

impl Default for StatusLogConfig {
    fn default() -> Self {
        Self {
            path: default_status_log_path(),
            max_lines: default_max_lines(),
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

impl GitHubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();
            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths
        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("starwatch").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.state.counts_file = shellexpand::full(&self.state.counts_file)
            .context("Failed to expand counts_file path")?
            .into_owned();

        self.state.checkpoint_file = shellexpand::full(&self.state.checkpoint_file)
            .context("Failed to expand checkpoint_file path")?
            .into_owned();

        self.status_log.path = shellexpand::full(&self.status_log.path)
            .context("Failed to expand status log path")?
            .into_owned();

        Ok(())
    }

    /// Path of the snapshot file used by the configured state mode
    pub fn state_path(&self) -> PathBuf {
        match self.state.mode {
            StateMode::Counts => PathBuf::from(&self.state.counts_file),
            StateMode::Since => PathBuf::from(&self.state.checkpoint_file),
        }
    }
}

/// Look up a required variable, treating empty values as absent
pub fn require_var<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_var(lookup, name).ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

pub fn optional_var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

/// Lookup backed by the process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
