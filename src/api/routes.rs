//! API route definitions

use crate::orchestrator::ModelAcquirer;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub acquirer: Arc<ModelAcquirer>,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and status
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Catalog and acquisition
        .route("/models", get(handlers::list_models))
        .route("/models/preload", post(handlers::preload))
        .route("/models/{kind}/ensure", post(handlers::ensure_model))
        // Cache management
        .route(
            "/cache",
            get(handlers::list_cache).delete(handlers::clear_cache),
        )
        .route("/cache/{name}", delete(handlers::remove_cache_entry))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
