//! Service settings for policy-ingest
//!
//! Resolved once at startup from the bootstrap TOML plus environment, then shared
//! read-only through [`crate::AppState`].
//!
//! LLM API key priority: `POLICY_LLM_API_KEY` → TOML `llm.api_key`. A missing key
//! is not fatal; the query endpoint reports 503 until one is configured.

use policy_common::config::{self, IngestionConfig, LlmConfig, TomlConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Accepted `batch_size` query parameter range
pub const MIN_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_path: PathBuf,
    pub llm: LlmConfig,
    pub llm_api_key: Option<String>,
    pub ingestion: IngestionConfig,
}

impl Settings {
    pub fn resolve(toml_config: &TomlConfig, root_folder: &Path) -> Self {
        let llm_api_key = config::resolve_llm_api_key(toml_config);
        match &llm_api_key {
            Some(_) => info!("LLM API key configured (model {})", toml_config.llm.model),
            None => warn!(
                "No LLM API key found in {} or TOML; natural-language queries are disabled",
                config::LLM_API_KEY_ENV
            ),
        }

        Self {
            port: toml_config.port,
            database_path: config::database_path(root_folder, toml_config),
            llm: toml_config.llm.clone(),
            llm_api_key,
            ingestion: toml_config.ingestion.clone(),
        }
    }

    /// Requested batch size, or the configured default
    pub fn batch_size(&self, requested: Option<usize>) -> Result<usize, String> {
        match requested {
            None => Ok(self.ingestion.default_batch_size),
            Some(size) if (MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) => Ok(size),
            Some(size) => Err(format!(
                "batch_size must be between {} and {}, got {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE, size
            )),
        }
    }

    /// Reject uploads by extension and size before reading them
    pub fn check_upload(&self, filename: &str, size_bytes: usize) -> Result<(), String> {
        if !self.ingestion.is_allowed_file(filename) {
            return Err(format!(
                "Unsupported file type: '{}'. Allowed: {}",
                filename,
                self.ingestion.allowed_file_types.join(", ")
            ));
        }
        if size_bytes as u64 > self.ingestion.max_file_size_bytes() {
            return Err(format!(
                "File size {} bytes exceeds limit of {} MB",
                size_bytes, self.ingestion.max_file_size_mb
            ));
        }
        if size_bytes == 0 {
            return Err("Uploaded file is empty".to_string());
        }
        Ok(())
    }
}
