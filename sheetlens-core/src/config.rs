//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/sheetlens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/sheetlens/` (~/.config/sheetlens/)
//! - Data: `$XDG_DATA_HOME/sheetlens/` (~/.local/share/sheetlens/)
//! - State/Logs: `$XDG_STATE_HOME/sheetlens/` (~/.local/state/sheetlens/)
//!
//! The file only holds static settings. The connected spreadsheet and the
//! user-editable analysis prompt are session state kept in the database
//! (see [`crate::types::SyncConfig`]).

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Model backend configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Spreadsheet endpoint configuration
    #[serde(default)]
    pub sheet: SheetConfig,

    /// Analysis fan-out and limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// System instructions sent to the model
    #[serde(default)]
    pub prompts: PromptConfig,

    /// Header aliases used to classify rows
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Model used for per-record extraction
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for aggregation (defaults to `model`)
    pub synthesis_model: Option<String>,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            synthesis_model: None,
            endpoint: None,
            api_key: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Model used for the three aggregation views
    pub fn synthesis_model(&self) -> &str {
        self.synthesis_model.as_deref().unwrap_or(&self.model)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_provider() -> LlmProvider {
    LlmProvider::Gemini
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

/// Supported model providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }

    /// Environment variables consulted for the API key, in order
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            LlmProvider::Gemini => &["GEMINI_API_KEY", "API_KEY"],
            LlmProvider::Ollama => &[],
            LlmProvider::Claude => &["ANTHROPIC_API_KEY"],
            LlmProvider::OpenAI => &["OPENAI_API_KEY"],
        }
    }
}

/// Spreadsheet export endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SheetConfig {
    /// Base URL of the spreadsheet service
    #[serde(default = "default_sheet_base_url")]
    pub base_url: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_sheet_timeout")]
    pub timeout_secs: u64,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            base_url: default_sheet_base_url(),
            timeout_secs: default_sheet_timeout(),
        }
    }
}

impl SheetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_sheet_base_url() -> String {
    "https://docs.google.com".to_string()
}

fn default_sheet_timeout() -> u64 {
    30
}

/// Analysis fan-out and limits
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Maximum number of record analyses in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Record content is truncated to this many characters in prompts
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_max_content_chars() -> usize {
    16_000
}

/// System instructions and default prompts
#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_analysis_instruction")]
    pub analysis: String,
    #[serde(default = "default_meta_instruction")]
    pub meta: String,
    /// Used when no analysis prompt has been set
    #[serde(default = "default_meta_prompt")]
    pub default_meta_prompt: String,
    #[serde(default = "default_dossier_instruction")]
    pub dossiers: String,
    #[serde(default = "default_column_instruction")]
    pub columns: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            analysis: default_analysis_instruction(),
            meta: default_meta_instruction(),
            default_meta_prompt: default_meta_prompt(),
            dossiers: default_dossier_instruction(),
            columns: default_column_instruction(),
        }
    }
}

fn default_analysis_instruction() -> String {
    "You are a world-class Business Intelligence Analyst. Extract data objectively.".to_string()
}

fn default_meta_instruction() -> String {
    "You are a Chief Product Officer. Analyze patterns and requested features.".to_string()
}

fn default_meta_prompt() -> String {
    "General analysis".to_string()
}

fn default_dossier_instruction() -> String {
    "You are the Lead Strategic Consultant. Produce:\n\
     1. Why customers say Yes or No.\n\
     2. Opportunities and Threats.\n\
     3. Act Now (6-8 items)."
        .to_string()
}

fn default_column_instruction() -> String {
    "You are a research analyst. Identify recurring themes across the selected columns, \
     summarize them, and list concrete insights."
        .to_string()
}

/// Header aliases, tried in order; the first non-empty value wins
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_content_aliases")]
    pub content: Vec<String>,
    #[serde(default = "default_category_aliases")]
    pub category: Vec<String>,
    #[serde(default = "default_label_aliases")]
    pub label: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            content: default_content_aliases(),
            category: default_category_aliases(),
            label: default_label_aliases(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_content_aliases() -> Vec<String> {
    strings(&["Transcript", "transcript", "Text", "text"])
}

fn default_category_aliases() -> Vec<String> {
    strings(&["Type", "type", "Category", "category"])
}

fn default_label_aliases() -> Vec<String> {
    strings(&["File", "file", "Date", "date"])
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 || self.pipeline.concurrency > 32 {
            return Err(Error::Config(
                "pipeline.concurrency must be between 1 and 32".to_string(),
            ));
        }
        if self.pipeline.max_content_chars == 0 {
            return Err(Error::Config(
                "pipeline.max_content_chars must be positive".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".to_string()));
        }
        if self.classifier.content.is_empty() {
            return Err(Error::Config(
                "classifier.content needs at least one alias".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/sheetlens/config.toml` (~/.config/sheetlens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("sheetlens").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/sheetlens/` (~/.local/share/sheetlens/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("sheetlens")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/sheetlens/` (~/.local/state/sheetlens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("sheetlens")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/sheetlens/data.db` (~/.local/share/sheetlens/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/sheetlens/sheetlens.log` (~/.local/state/sheetlens/sheetlens.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("sheetlens.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
