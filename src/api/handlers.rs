//! API request handlers

use super::models::{
    CacheEntryInfo, CacheResponse, EnsureResponse, HealthResponse, ModelInfo, PreloadResponse,
};
use super::routes::AppState;
use crate::catalog::ModelKind;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// GET /health - Manager health check
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// GET /models - Catalog with cache status
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    let cache = state.acquirer.cache();

    let mut models = Vec::new();
    for descriptor in state.acquirer.catalog().list() {
        let entry = cache.get(&descriptor.name).await;
        models.push(ModelInfo::from_descriptor(descriptor, entry.as_ref()));
    }

    Json(models)
}

/// POST /models/{kind}/ensure - Make a model available, downloading if needed
pub async fn ensure_model(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<EnsureResponse>, ApiError> {
    let kind: ModelKind = kind.parse().map_err(ApiError::BadRequest)?;

    let descriptor = state.acquirer.acquire(kind).await?;
    crate::metrics::update_cache_bytes(state.acquirer.cache().total_bytes().await);

    Ok(Json(descriptor.into()))
}

/// POST /models/preload - Acquire every catalog model
pub async fn preload(State(state): State<AppState>) -> Json<PreloadResponse> {
    let reports = state.acquirer.download_all().await;
    crate::metrics::update_cache_bytes(state.acquirer.cache().total_bytes().await);

    Json(reports.into())
}

/// GET /cache - Cache contents
pub async fn list_cache(State(state): State<AppState>) -> Json<CacheResponse> {
    let cache = state.acquirer.cache();
    let policy = cache.policy();

    let entries: Vec<CacheEntryInfo> = cache
        .entries()
        .await
        .into_iter()
        .map(|(name, entry)| CacheEntryInfo::new(name, entry))
        .collect();
    let total_bytes = entries.iter().map(|e| e.size_bytes).sum();

    Json(CacheResponse {
        cache_dir: cache.cache_dir().to_path_buf(),
        total_bytes,
        max_total_bytes: policy.max_total_bytes,
        max_age_secs: policy.max_age.as_secs(),
        entries,
    })
}

/// DELETE /cache - Drop every cached artifact
pub async fn clear_cache(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let removed = state.acquirer.clear_cache().await?;
    tracing::info!(removed = removed, "Cache cleared via API");
    crate::metrics::update_cache_bytes(0);

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cache/{name} - Drop one cached artifact
pub async fn remove_cache_entry(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let cache = state.acquirer.cache();
    if !cache.remove(&name).await {
        return Err(ApiError::NotFound(format!("No cache entry named '{}'", name)));
    }
    crate::metrics::update_cache_bytes(cache.total_bytes().await);

    Ok(StatusCode::NO_CONTENT)
}
