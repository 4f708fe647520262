//! Model acquisition orchestration
//!
//! Sequences catalog lookup, cache lookup, local file verification, disk
//! space checks and downloads into a single "ensure available" call:
//!
//! ```text
//! catalog ──absent──────────────────────────────────────────▶ Unavailable
//!    │
//! cache hit ──────────────────────────▶ CacheHit ──────────▶ Ready
//!    │ miss
//! local file ──checksum ok──▶ LocalFileValid ──cache──────▶ Ready
//!    │        └─mismatch───▶ LocalFileInvalid ────────────▶ Unavailable
//!    │ absent
//! DownloadNeeded ──no space─────────────────────────────────▶ Unavailable
//!    ├──fetch failed──▶ DownloadFailed ─────────────────────▶ Unavailable
//!    └──fetch ok──verify──cache─────────────────────────────▶ Ready
//! ```
//!
//! There is no per-model lock: two concurrent callers asking for the same
//! absent model may both download it.

use crate::cache::CacheIndex;
use crate::catalog::{ModelCatalog, ModelDescriptor, ModelKind};
use crate::checksum;
use crate::disk::DiskSpace;
use crate::download::Downloader;
use crate::error::{AcquireError, FailureCategory};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// States of a single acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    CacheHit,
    LocalFileValid,
    LocalFileInvalid,
    DownloadNeeded,
    DownloadFailed,
    Ready,
    Unavailable,
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CacheHit => write!(f, "cache_hit"),
            Self::LocalFileValid => write!(f, "local_file_valid"),
            Self::LocalFileInvalid => write!(f, "local_file_invalid"),
            Self::DownloadNeeded => write!(f, "download_needed"),
            Self::DownloadFailed => write!(f, "download_failed"),
            Self::Ready => write!(f, "ready"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Outcome of preloading one catalog model
#[derive(Debug, Clone, Serialize)]
pub struct PreloadReport {
    pub model: String,
    pub kind: ModelKind,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Coordinates catalog, cache, disk and downloader
///
/// Owns no persistent state of its own.
pub struct ModelAcquirer {
    catalog: ModelCatalog,
    cache: Arc<CacheIndex>,
    downloader: Downloader,
    disk: Arc<dyn DiskSpace>,
}

impl ModelAcquirer {
    pub fn new(
        catalog: ModelCatalog,
        cache: Arc<CacheIndex>,
        downloader: Downloader,
        disk: Arc<dyn DiskSpace>,
    ) -> Self {
        Self {
            catalog,
            cache,
            downloader,
            disk,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<CacheIndex> {
        &self.cache
    }

    /// Make the model of `kind` available on disk
    ///
    /// Returns the descriptor with `local_path` pointing at a usable file, or
    /// `None` if the model cannot be made available. Use [`Self::acquire`]
    /// to learn why.
    pub async fn ensure_available(&self, kind: ModelKind) -> Option<ModelDescriptor> {
        match self.acquire(kind).await {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    category = %e.category(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Model unavailable"
                );
                None
            }
        }
    }

    /// Like [`Self::ensure_available`] but reports the failure category
    pub async fn acquire(&self, kind: ModelKind) -> Result<ModelDescriptor, AcquireError> {
        let Some(descriptor) = self.catalog.find_by_kind(kind) else {
            transition(kind.as_str(), AcquisitionState::Unavailable);
            crate::metrics::record_acquisition_failure(kind.as_str(), "configuration");
            return Err(AcquireError::UnknownKind { kind });
        };

        self.acquire_descriptor(descriptor).await
    }

    /// Run the acquisition state machine for a specific descriptor
    pub async fn acquire_descriptor(
        &self,
        descriptor: ModelDescriptor,
    ) -> Result<ModelDescriptor, AcquireError> {
        let name = descriptor.name.clone();
        let result = self.run(descriptor).await;

        match &result {
            Ok(ready) => {
                transition(&name, AcquisitionState::Ready);
                tracing::info!(model = %name, path = ?ready.local_path, "Model ready");
            }
            Err(e) => {
                transition(&name, AcquisitionState::Unavailable);
                crate::metrics::record_acquisition_failure(&name, e.category().as_str());
            }
        }

        result
    }

    /// Acquire every catalog model, continuing past failures
    pub async fn download_all(&self) -> Vec<PreloadReport> {
        let mut reports = Vec::with_capacity(self.catalog.len());

        for descriptor in self.catalog.list() {
            let model = descriptor.name.clone();
            let kind = descriptor.kind;

            let report = match self.acquire_descriptor(descriptor).await {
                Ok(ready) => PreloadReport {
                    model,
                    kind,
                    ready: true,
                    local_path: Some(ready.local_path),
                    category: None,
                    error: None,
                },
                Err(e) => {
                    tracing::error!(
                        model = %model,
                        category = %e.category(),
                        error = %e,
                        "Failed to preload model"
                    );
                    PreloadReport {
                        model,
                        kind,
                        ready: false,
                        local_path: None,
                        category: Some(e.category()),
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        let ready = reports.iter().filter(|r| r.ready).count();
        tracing::info!(
            ready = ready,
            failed = reports.len() - ready,
            "Model preload complete"
        );

        reports
    }

    /// Drop every cached artifact
    pub async fn clear_cache(&self) -> anyhow::Result<usize> {
        self.cache.clear().await
    }

    async fn run(&self, mut descriptor: ModelDescriptor) -> Result<ModelDescriptor, AcquireError> {
        let name = descriptor.name.clone();

        if let Some(entry) = self.cache.lookup(&name).await {
            if entry.version == descriptor.version {
                transition(&name, AcquisitionState::CacheHit);
                self.cache.touch(&name).await;
                crate::metrics::record_cache_hit(&name);
                descriptor.local_path = entry.cached_path;
                return Ok(descriptor);
            }
            tracing::info!(
                model = %name,
                cached_version = %entry.version,
                wanted_version = %descriptor.version,
                "Cached version is outdated"
            );
        }
        crate::metrics::record_cache_miss(&name);

        let local_path = descriptor.local_path.clone();
        if file_exists(&local_path).await {
            if descriptor.has_checksum()
                && !checksum::verify(&local_path, &descriptor.expected_checksum).await
            {
                // Left in place for an operator to inspect or delete
                transition(&name, AcquisitionState::LocalFileInvalid);
                return Err(AcquireError::ChecksumMismatch {
                    model: name,
                    path: local_path,
                });
            }

            transition(&name, AcquisitionState::LocalFileValid);
            return self.cache_artifact(descriptor, &local_path).await;
        }

        transition(&name, AcquisitionState::DownloadNeeded);
        self.check_space(&descriptor)?;

        let downloaded = match self.downloader.download(&descriptor).await {
            Ok(path) => {
                crate::metrics::record_download(&name, "success");
                path
            }
            Err(source) => {
                transition(&name, AcquisitionState::DownloadFailed);
                crate::metrics::record_download(&name, "failure");
                return Err(AcquireError::Download {
                    model: name,
                    source,
                });
            }
        };

        if descriptor.has_checksum()
            && !checksum::verify(&downloaded, &descriptor.expected_checksum).await
        {
            // A fresh download that fails verification is never usable
            if let Err(e) = fs::remove_file(&downloaded).await {
                tracing::warn!(path = ?downloaded, error = %e, "Failed to delete corrupt download");
            }
            return Err(AcquireError::ChecksumMismatch {
                model: name,
                path: downloaded,
            });
        }

        self.cache_artifact(descriptor, &downloaded).await
    }

    fn check_space(&self, descriptor: &ModelDescriptor) -> Result<(), AcquireError> {
        let usage = self.disk.usage(&descriptor.local_path).map_err(|e| {
            AcquireError::Filesystem {
                model: descriptor.name.clone(),
                message: format!("Failed to query disk space: {}", e),
            }
        })?;

        if usage.available_bytes < descriptor.required_bytes {
            return Err(AcquireError::InsufficientSpace {
                model: descriptor.name.clone(),
                required_bytes: descriptor.required_bytes,
                available_bytes: usage.available_bytes,
            });
        }

        tracing::debug!(
            model = %descriptor.name,
            required_bytes = descriptor.required_bytes,
            available_bytes = usage.available_bytes,
            total_bytes = usage.total_bytes,
            "Disk space check passed"
        );

        Ok(())
    }

    async fn cache_artifact(
        &self,
        mut descriptor: ModelDescriptor,
        path: &Path,
    ) -> Result<ModelDescriptor, AcquireError> {
        let size_bytes = fs::metadata(path)
            .await
            .map_err(|e| AcquireError::Filesystem {
                model: descriptor.name.clone(),
                message: format!("Failed to stat {:?}: {}", path, e),
            })?
            .len();

        match self
            .cache
            .insert(&descriptor.name, path, size_bytes, &descriptor.version)
            .await
        {
            Ok(Some(entry)) => descriptor.local_path = entry.cached_path,
            Ok(None) => {
                tracing::warn!(
                    model = %descriptor.name,
                    size_bytes = size_bytes,
                    "Artifact larger than cache ceiling, serving from local path"
                );
                descriptor.local_path = path.to_path_buf();
            }
            Err(e) => {
                tracing::warn!(
                    model = %descriptor.name,
                    error = %e,
                    "Failed to cache artifact, serving from local path"
                );
                descriptor.local_path = path.to_path_buf();
            }
        }

        Ok(descriptor)
    }
}

fn transition(model: &str, state: AcquisitionState) {
    tracing::debug!(model = %model, state = %state, "Acquisition state");
}

async fn file_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}
