//! Artifact download pipeline
//!
//! Fetches a model artifact over HTTP(S) under a fixed deadline. Each session
//! streams the body to its own uniquely named `.part` file next to the target
//! and renames it into place only after the whole body has been written and
//! synced. Concurrent downloads of one model never share a staging file, and
//! a failed, cancelled or dropped download removes its staging file.

use crate::catalog::ModelDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

const PART_SUFFIX: &str = ".part";

/// Download failures
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Download of {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Download of {url} was cancelled")]
    Cancelled { url: String },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Whether the failure came from the remote side rather than local disk
    pub fn is_network(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// Source of remote artifact bytes
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Start a GET and return the body stream
    ///
    /// Non-2xx responses are reported as `DownloadError::Status`.
    async fn fetch(&self, url: &str) -> Result<ByteStream, DownloadError>;
}

/// Production fetcher backed by reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("model-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ByteStream, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let url = url.to_string();
        Ok(response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| DownloadError::Network {
                    url: url.clone(),
                    message: e.to_string(),
                })
            })
            .boxed())
    }
}

/// One download attempt
///
/// Lives only for the duration of the transfer. Cancelling the token aborts
/// the transfer at the next await point.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub descriptor: ModelDescriptor,
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl DownloadSession {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Whole-artifact downloader with a per-attempt deadline
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a session whose deadline starts now
    pub fn session(&self, descriptor: ModelDescriptor) -> DownloadSession {
        DownloadSession {
            descriptor,
            deadline: Instant::now() + self.timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Download a descriptor's artifact to its `local_path`
    ///
    /// Free-space checks are the caller's job. No retries are attempted.
    pub async fn download(&self, descriptor: &ModelDescriptor) -> Result<PathBuf, DownloadError> {
        let session = self.session(descriptor.clone());
        self.run(&session).await
    }

    /// Run a prepared session to completion, timeout or cancellation
    pub async fn run(&self, session: &DownloadSession) -> Result<PathBuf, DownloadError> {
        let descriptor = &session.descriptor;
        let url = descriptor.source_url.as_str();
        let target = descriptor.local_path.as_path();
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;

        // One staging file per session; removed on drop unless persisted
        let (file, part_path) = tempfile::Builder::new()
            .prefix(&format!(".{}.", descriptor.file_name()))
            .suffix(PART_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| DownloadError::io(parent, e))?
            .into_parts();

        tracing::info!(
            model = %descriptor.name,
            url = %url,
            timeout_secs = self.timeout.as_secs(),
            "Starting download"
        );

        let transfer = self.transfer(url, fs::File::from_std(file), &part_path);
        let result = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(DownloadError::Cancelled {
                url: url.to_string(),
            }),
            transfer = tokio::time::timeout_at(session.deadline, transfer) => {
                match transfer {
                    Ok(result) => result,
                    Err(_) => Err(DownloadError::Timeout {
                        url: url.to_string(),
                        timeout: self.timeout,
                    }),
                }
            }
        };

        let bytes_written = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(model = %descriptor.name, error = %e, "Download failed");
                return Err(e);
            }
        };

        part_path
            .persist(target)
            .map_err(|e| DownloadError::io(target, e.error))?;

        tracing::info!(
            model = %descriptor.name,
            path = ?target,
            bytes = bytes_written,
            "Download complete"
        );

        Ok(target.to_path_buf())
    }

    async fn transfer(
        &self,
        url: &str,
        mut file: fs::File,
        part_path: &Path,
    ) -> Result<u64, DownloadError> {
        let mut stream = self.fetcher.fetch(url).await?;

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(part_path, e))?;
            written += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io(part_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::io(part_path, e))?;

        Ok(written)
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
