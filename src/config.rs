//! Configuration structures and loading logic

use crate::cache::EvictionPolicy;
use crate::catalog::{ModelCatalog, ModelDescriptor};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main manager configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub api_port: u16,
    /// Directory holding the cache index and cached artifacts
    pub cache_dir: PathBuf,
    /// Root for the built-in catalog's local model paths
    pub models_dir: PathBuf,
    pub max_cache_bytes: u64,
    pub max_age_days: u64,
    pub download_timeout_secs: u64,
    pub preload_on_start: bool,
    /// Catalog override; the built-in catalog is used when empty
    pub models: Vec<ModelDescriptor>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            cache_dir: default_cache_dir(),
            models_dir: default_models_dir(),
            max_cache_bytes: default_max_cache_bytes(),
            max_age_days: default_max_age_days(),
            download_timeout_secs: default_download_timeout(),
            preload_on_start: false,
            models: Vec::new(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("MODEL_MANAGER_API_PORT") {
            config.api_port = port
                .parse()
                .context("Invalid MODEL_MANAGER_API_PORT value")?;
        }
        if let Ok(cache_dir) = std::env::var("MODEL_MANAGER_CACHE_DIR") {
            config.cache_dir = PathBuf::from(cache_dir);
        }
        if let Ok(models_dir) = std::env::var("MODEL_MANAGER_MODELS_DIR") {
            config.models_dir = PathBuf::from(models_dir);
        }
        if let Ok(bytes) = std::env::var("MODEL_MANAGER_MAX_CACHE_BYTES") {
            config.max_cache_bytes = bytes
                .parse()
                .context("Invalid MODEL_MANAGER_MAX_CACHE_BYTES value")?;
        }
        if let Ok(days) = std::env::var("MODEL_MANAGER_MAX_AGE_DAYS") {
            config.max_age_days = days
                .parse()
                .context("Invalid MODEL_MANAGER_MAX_AGE_DAYS value")?;
        }
        if let Ok(secs) = std::env::var("MODEL_MANAGER_DOWNLOAD_TIMEOUT_SECS") {
            config.download_timeout_secs = secs
                .parse()
                .context("Invalid MODEL_MANAGER_DOWNLOAD_TIMEOUT_SECS value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port < 1024 {
            anyhow::bail!("API port must be >= 1024 (got {})", self.api_port);
        }
        if self.max_cache_bytes == 0 {
            anyhow::bail!("max_cache_bytes must be greater than 0");
        }
        if self.max_age_days == 0 {
            anyhow::bail!("max_age_days must be greater than 0");
        }
        if self.download_timeout_secs == 0 {
            anyhow::bail!("download_timeout_secs must be greater than 0");
        }

        let mut names = HashSet::new();
        let mut kinds = HashSet::new();

        for model in &self.models {
            if model.name.is_empty() {
                anyhow::bail!("Model name cannot be empty");
            }
            if !names.insert(&model.name) {
                anyhow::bail!("Duplicate model name: {}", model.name);
            }
            // find_by_kind must be deterministic
            if !kinds.insert(model.kind) {
                anyhow::bail!("More than one model configured for kind '{}'", model.kind);
            }
            if !model.source_url.starts_with("http://") && !model.source_url.starts_with("https://")
            {
                anyhow::bail!(
                    "Model '{}' source_url must be http(s) (got {})",
                    model.name,
                    model.source_url
                );
            }
            let checksum = model.expected_checksum.trim();
            if !checksum.is_empty()
                && (checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()))
            {
                anyhow::bail!(
                    "Model '{}' expected_checksum must be a 64 character SHA-256 hex digest",
                    model.name
                );
            }
        }

        Ok(())
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(
            self.max_cache_bytes,
            Duration::from_secs(self.max_age_days.saturating_mul(24 * 60 * 60)),
        )
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Catalog from configured models, or the built-in one
    pub fn catalog(&self) -> Result<ModelCatalog> {
        if self.models.is_empty() {
            Ok(ModelCatalog::builtin(&self.models_dir))
        } else {
            ModelCatalog::new(self.models.clone())
        }
    }
}

// Default functions
fn default_api_port() -> u16 {
    9000
}
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("model-manager"))
        .unwrap_or_else(|| PathBuf::from("/tmp/model-manager"))
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("model-manager"))
        .unwrap_or_else(|| default_data_dir().join("cache"))
}
fn default_models_dir() -> PathBuf {
    default_data_dir().join("models")
}
fn default_max_cache_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}
fn default_max_age_days() -> u64 {
    30
}
fn default_download_timeout() -> u64 {
    300
}
