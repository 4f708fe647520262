//! Typed handles over acquired models
//!
//! Each model kind gets its own variant; initialization and validation are
//! shared free functions that take the kind as a parameter.

use crate::catalog::{ModelDescriptor, ModelKind};
use crate::orchestrator::ModelAcquirer;
use anyhow::{Context, Result};
use std::path::Path;

/// A model whose artifact is present and validated on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelHandle {
    Transcription(ModelDescriptor),
    Summarization(ModelDescriptor),
}

impl ModelHandle {
    fn new(descriptor: ModelDescriptor) -> Self {
        match descriptor.kind {
            ModelKind::Transcription => Self::Transcription(descriptor),
            ModelKind::Summarization => Self::Summarization(descriptor),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Transcription(_) => ModelKind::Transcription,
            Self::Summarization(_) => ModelKind::Summarization,
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        match self {
            Self::Transcription(d) | Self::Summarization(d) => d,
        }
    }

    /// Resolved artifact path
    pub fn path(&self) -> &Path {
        &self.descriptor().local_path
    }
}

/// Acquire the model of `kind` and validate its artifact
pub async fn initialize(acquirer: &ModelAcquirer, kind: ModelKind) -> Result<ModelHandle> {
    let descriptor = acquirer
        .acquire(kind)
        .await
        .with_context(|| format!("Failed to acquire {} model", kind))?;

    let handle = ModelHandle::new(descriptor);
    validate(&handle).await?;

    tracing::info!(
        kind = %handle.kind(),
        model = %handle.descriptor().name,
        path = ?handle.path(),
        "Model initialized"
    );

    Ok(handle)
}

/// Check that a handle's artifact is a non-empty regular file
pub async fn validate(handle: &ModelHandle) -> Result<()> {
    let path = handle.path();
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Model file not accessible: {:?}", path))?;

    if !metadata.is_file() {
        anyhow::bail!("Model path is not a file: {:?}", path);
    }
    if metadata.len() == 0 {
        anyhow::bail!("Model file is empty: {:?}", path);
    }

    Ok(())
}
