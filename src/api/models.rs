//! API request and response models

use crate::cache::CacheEntry;
use crate::catalog::{ModelDescriptor, ModelKind};
use crate::orchestrator::PreloadReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Catalog model with its cache status
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub kind: ModelKind,
    pub version: String,
    pub source_url: String,
    pub local_path: PathBuf,
    pub required_bytes: u64,
    pub has_checksum: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub cached: bool,
}

impl ModelInfo {
    pub fn from_descriptor(descriptor: ModelDescriptor, cached: Option<&CacheEntry>) -> Self {
        let has_checksum = descriptor.has_checksum();
        // A stale version in the cache is not servable
        let cached = cached.is_some_and(|entry| entry.version == descriptor.version);

        Self {
            name: descriptor.name,
            kind: descriptor.kind,
            version: descriptor.version,
            source_url: descriptor.source_url,
            local_path: descriptor.local_path,
            required_bytes: descriptor.required_bytes,
            has_checksum,
            description: descriptor.description,
            cached,
        }
    }
}

/// Result of a successful ensure call
#[derive(Debug, Serialize, Deserialize)]
pub struct EnsureResponse {
    pub name: String,
    pub kind: ModelKind,
    pub version: String,
    pub local_path: PathBuf,
}

impl From<ModelDescriptor> for EnsureResponse {
    fn from(descriptor: ModelDescriptor) -> Self {
        Self {
            name: descriptor.name,
            kind: descriptor.kind,
            version: descriptor.version,
            local_path: descriptor.local_path,
        }
    }
}

/// Per-model preload outcome
#[derive(Debug, Serialize)]
pub struct PreloadResponse {
    pub ready: usize,
    pub failed: usize,
    pub models: Vec<PreloadReport>,
}

impl From<Vec<PreloadReport>> for PreloadResponse {
    fn from(models: Vec<PreloadReport>) -> Self {
        let ready = models.iter().filter(|r| r.ready).count();
        Self {
            ready,
            failed: models.len() - ready,
            models,
        }
    }
}

/// One cache index entry
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntryInfo {
    pub name: String,
    pub cached_path: PathBuf,
    pub size_bytes: u64,
    pub version: String,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl CacheEntryInfo {
    pub fn new(name: String, entry: CacheEntry) -> Self {
        Self {
            name,
            last_used: chrono::DateTime::from_timestamp_millis(entry.last_used_ms),
            cached_path: entry.cached_path,
            size_bytes: entry.size_bytes,
            version: entry.version,
        }
    }
}

/// Cache contents and limits
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheResponse {
    pub cache_dir: PathBuf,
    pub total_bytes: u64,
    pub max_total_bytes: u64,
    pub max_age_secs: u64,
    pub entries: Vec<CacheEntryInfo>,
}
