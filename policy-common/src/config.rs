//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration is deliberately two-layered:
//! 1. **TOML bootstrap**: root folder, port, logging, LLM and ingestion tuning
//! 2. **Process environment / CLI**: overrides for the root folder and LLM API key
//!
//! Everything is loaded once at process start into plain structs and passed by
//! reference to the components that need it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "POLICY_ROOT_FOLDER";

/// Environment variable carrying the LLM API key
pub const LLM_API_KEY_ENV: &str = "POLICY_LLM_API_KEY";

/// Directory name used under the platform config/data directories
const APP_DIR_NAME: &str = "policy-rag";

/// Database file name inside the root folder
const DEFAULT_DATABASE_FILE: &str = "policies.db";

/// Bootstrap configuration loaded from TOML file
///
/// Every section is optional; a missing file yields `TomlConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional, see [`resolve_root_folder`])
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database file path, relative paths are resolved against the root folder
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Hosted language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Spreadsheet ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error), `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Hosted language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (environment variable takes priority)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens (100 - 8192)
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Nucleus sampling (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k sampling (1 - 100)
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Client-side request rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Spreadsheet ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Batch size used when the request does not specify one (100 - 10000)
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Maximum upload size in megabytes (1 - 500)
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Maximum data rows accepted by structure validation (1 - 1_000_000)
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Accepted upload extensions (lowercase, no dot)
    #[serde(default = "default_allowed_file_types")]
    pub allowed_file_types: Vec<String>,

    /// Absolute tolerance for the retention + treaty = total consistency check
    #[serde(default = "default_consistency_tolerance")]
    pub consistency_tolerance: f64,

    /// Primary header overrides: canonical field name -> header text
    #[serde(default)]
    pub primary_headers: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_top_p() -> f32 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_file_size_mb() -> u64 {
    50
}

fn default_max_rows() -> usize {
    100_000
}

fn default_allowed_file_types() -> Vec<String> {
    vec!["xlsx".to_string(), "xls".to_string(), "csv".to_string()]
}

fn default_consistency_tolerance() -> f64 {
    0.01
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            database_path: None,
            logging: LoggingConfig::default(),
            llm: LlmConfig::default(),
            ingestion: IngestionConfig::default(),
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

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            requests_per_second: default_requests_per_second(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            max_file_size_mb: default_max_file_size_mb(),
            max_rows: default_max_rows(),
            allowed_file_types: default_allowed_file_types(),
            consistency_tolerance: default_consistency_tolerance(),
            primary_headers: BTreeMap::new(),
        }
    }
}

impl IngestionConfig {
    /// Maximum upload size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Check whether a filename carries an accepted extension
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        file_extension(filename)
            .map(|ext| self.allowed_file_types.iter().any(|allowed| *allowed == ext))
            .unwrap_or(false)
    }
}

impl TomlConfig {
    /// Validate value ranges
    ///
    /// Returns the first violation found as `Error::Config`.
    pub fn validate(&self) -> Result<()> {
        if self.port < 1000 {
            return Err(Error::Config(format!("port must be >= 1000, got {}", self.port)));
        }

        let llm = &self.llm;
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(Error::Config(format!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                llm.temperature
            )));
        }
        if !(100..=8192).contains(&llm.max_output_tokens) {
            return Err(Error::Config(format!(
                "llm.max_output_tokens must be between 100 and 8192, got {}",
                llm.max_output_tokens
            )));
        }
        if !(0.0..=1.0).contains(&llm.top_p) {
            return Err(Error::Config(format!(
                "llm.top_p must be between 0.0 and 1.0, got {}",
                llm.top_p
            )));
        }
        if !(1..=100).contains(&llm.top_k) {
            return Err(Error::Config(format!(
                "llm.top_k must be between 1 and 100, got {}",
                llm.top_k
            )));
        }
        if llm.requests_per_second == 0 {
            return Err(Error::Config("llm.requests_per_second must be > 0".to_string()));
        }

        let ingestion = &self.ingestion;
        if !(100..=10_000).contains(&ingestion.default_batch_size) {
            return Err(Error::Config(format!(
                "ingestion.default_batch_size must be between 100 and 10000, got {}",
                ingestion.default_batch_size
            )));
        }
        if !(1..=500).contains(&ingestion.max_file_size_mb) {
            return Err(Error::Config(format!(
                "ingestion.max_file_size_mb must be between 1 and 500, got {}",
                ingestion.max_file_size_mb
            )));
        }
        if !(1..=1_000_000).contains(&ingestion.max_rows) {
            return Err(Error::Config(format!(
                "ingestion.max_rows must be between 1 and 1000000, got {}",
                ingestion.max_rows
            )));
        }
        if ingestion.consistency_tolerance < 0.0 {
            return Err(Error::Config(
                "ingestion.consistency_tolerance must be >= 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Locate the config file
///
/// Priority: explicit path → `~/.config/policy-rag/config.toml` → `/etc/policy-rag/config.toml`.
/// An explicit path is returned even if it does not exist so the caller can report it.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load bootstrap config with graceful degradation
///
/// A missing implicit config file is not an error: defaults are used and a warning
/// is logged. An explicit path that is missing or malformed is an error.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    match locate_config_file(explicit) {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Some(path) => Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        ))),
        None => {
            warn!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `POLICY_ROOT_FOLDER`
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./policy_rag_data"))
}

/// Database file location
///
/// Absolute `database_path` is used as-is; a relative one is joined to the root folder.
pub fn database_path(root_folder: &Path, config: &TomlConfig) -> PathBuf {
    match &config.database_path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => root_folder.join(path),
        None => root_folder.join(DEFAULT_DATABASE_FILE),
    }
}

/// Resolve the LLM API key
///
/// **Priority:** ENV → TOML. Returns `None` when no valid key is configured.
pub fn resolve_llm_api_key(config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(LLM_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = config.llm.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("LLM API key found in both environment and TOML. Using environment.");
    }

    env_key.or(toml_key)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Lowercase extension of a filename, without the dot
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ingestion.default_batch_size, 1000);
        assert_eq!(config.llm.top_k, 40);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 9100

            [ingestion]
            default_batch_size = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.ingestion.default_batch_size, 500);
        assert_eq!(config.ingestion.max_file_size_mb, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_out_of_range_batch_size() {
        let mut config = TomlConfig::default();
        config.ingestion.default_batch_size = 50;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_batch_size"));
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = TomlConfig::default();
        config.llm.temperature = 2.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_allowed_file_check_is_case_insensitive() {
        let ingestion = IngestionConfig::default();
        assert!(ingestion.is_allowed_file("Policies.XLSX"));
        assert!(ingestion.is_allowed_file("export.csv"));
        assert!(!ingestion.is_allowed_file("notes.txt"));
        assert!(!ingestion.is_allowed_file("no_extension"));
    }

    #[test]
    fn test_database_path_resolution() {
        let root = PathBuf::from("/srv/policy");
        let mut config = TomlConfig::default();
        assert_eq!(database_path(&root, &config), root.join("policies.db"));

        config.database_path = Some(PathBuf::from("data/custom.db"));
        assert_eq!(database_path(&root, &config), root.join("data/custom.db"));

        config.database_path = Some(PathBuf::from("/var/lib/custom.db"));
        assert_eq!(
            database_path(&root, &config),
            PathBuf::from("/var/lib/custom.db")
        );
    }
}
