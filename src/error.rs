//! Error types for acquisition failures and API responses

use crate::catalog::ModelKind;
use crate::download::DownloadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Broad class of an acquisition failure, for retry and alerting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Missing catalog entry or bad configuration
    Configuration,
    /// Not enough free disk space
    Space,
    /// Checksum mismatch
    Integrity,
    /// Timeout, connection failure or bad HTTP status
    Network,
    /// Local filesystem failure
    Filesystem,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Space => "space",
            Self::Integrity => "integrity",
            Self::Network => "network",
            Self::Filesystem => "filesystem",
        }
    }

    /// Transient failures a caller may retry without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Filesystem)
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a model could not be made available
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("No model registered for kind '{kind}'")]
    UnknownKind { kind: ModelKind },

    #[error(
        "Insufficient disk space for {model}: {required_bytes} bytes required, {available_bytes} available"
    )]
    InsufficientSpace {
        model: String,
        required_bytes: u64,
        available_bytes: u64,
    },

    #[error("Checksum mismatch for {model} at {path:?}")]
    ChecksumMismatch {
        model: String,
        path: std::path::PathBuf,
    },

    #[error("Download of {model} failed: {source}")]
    Download {
        model: String,
        #[source]
        source: DownloadError,
    },

    #[error("Filesystem error for {model}: {message}")]
    Filesystem { model: String, message: String },
}

impl AcquireError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::UnknownKind { .. } => FailureCategory::Configuration,
            Self::InsufficientSpace { .. } => FailureCategory::Space,
            Self::ChecksumMismatch { .. } => FailureCategory::Integrity,
            Self::Download { source, .. } if source.is_network() => FailureCategory::Network,
            Self::Download { .. } | Self::Filesystem { .. } => FailureCategory::Filesystem,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Acquisition(AcquireError),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, category) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Acquisition(err) => {
                let category = err.category();
                let status = match category {
                    FailureCategory::Configuration => StatusCode::NOT_FOUND,
                    FailureCategory::Space => StatusCode::INSUFFICIENT_STORAGE,
                    FailureCategory::Integrity => StatusCode::CONFLICT,
                    FailureCategory::Network => StatusCode::BAD_GATEWAY,
                    FailureCategory::Filesystem => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string(), Some(category))
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            category,
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<AcquireError> for ApiError {
    fn from(err: AcquireError) -> Self {
        ApiError::Acquisition(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<FailureCategory>,
    timestamp: chrono::DateTime<chrono::Utc>,
}
