//! Integration tests that run the API in-process
//!
//! The API is served with axum-test and model downloads hit a wiremock
//! server, so every layer from HTTP handler to cache index runs for real.

use axum_test::TestServer;
use model_manager::{
    CacheIndex, Downloader, EvictionPolicy, HttpFetcher, ModelAcquirer, ModelCatalog,
    ModelDescriptor, ModelKind,
    api::routes::{AppState, create_router},
    checksum::digest_str,
    disk::FixedDiskSpace,
    metrics,
};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WHISPER_BODY: &str = "whisper weights";
const BART_BODY: &str = "bart weights";

// Global metrics handle - only initialize once per test process
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| metrics::setup_metrics().expect("Failed to setup metrics"))
        .clone()
}

fn catalog(base_url: &str, models_dir: &Path) -> ModelCatalog {
    ModelCatalog::new(vec![
        ModelDescriptor {
            name: "whisper-small".to_string(),
            kind: ModelKind::Transcription,
            source_url: format!("{}/ggml-small.bin", base_url),
            expected_checksum: digest_str(WHISPER_BODY),
            local_path: models_dir.join("ggml-small.bin"),
            version: "1.0".to_string(),
            required_bytes: 1_000,
            description: "Speech recognition".to_string(),
        },
        ModelDescriptor {
            name: "bart-large-cnn".to_string(),
            kind: ModelKind::Summarization,
            source_url: format!("{}/bart.bin", base_url),
            expected_checksum: String::new(),
            local_path: models_dir.join("bart.bin"),
            version: "1.0".to_string(),
            required_bytes: 1_000,
            description: String::new(),
        },
    ])
    .expect("Failed to build catalog")
}

/// Helper to create a test server backed by a mock model host
async fn create_test_server(available_bytes: u64) -> (TestServer, MockServer, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ggml-small.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WHISPER_BODY))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bart.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BART_BODY))
        .mount(&mock_server)
        .await;

    let cache = CacheIndex::open(temp_dir.path().join("cache"), EvictionPolicy::default())
        .await
        .expect("Failed to open cache");
    let downloader = Downloader::new(
        Arc::new(HttpFetcher::new().expect("Failed to build fetcher")),
        Duration::from_secs(10),
    );

    let acquirer = ModelAcquirer::new(
        catalog(&mock_server.uri(), &temp_dir.path().join("models")),
        Arc::new(cache),
        downloader,
        Arc::new(FixedDiskSpace::available(available_bytes)),
    );

    let state = AppState {
        acquirer: Arc::new(acquirer),
        prometheus_handle: get_metrics_handle(),
    };

    let app = create_router(state);
    let server = TestServer::try_new(app).expect("Failed to create test server");

    (server, mock_server, temp_dir)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _mock, _temp_dir) = create_test_server(u64::MAX).await;

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (server, _mock, _temp_dir) = create_test_server(u64::MAX).await;

    server.post("/models/transcription/ensure").await;
    let response = server.get("/metrics").await;

    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("model_manager_downloads_total"));
}

#[tokio::test]
async fn test_list_models_before_acquisition() {
    let (server, _mock, _temp_dir) = create_test_server(u64::MAX).await;

    let response = server.get("/models").await;
    assert_eq!(response.status_code(), 200);

    let models: Vec<serde_json::Value> = response.json();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0]["name"], "whisper-small");
    assert_eq!(models[0]["kind"], "transcription");
    assert_eq!(models[0]["has_checksum"], true);
    assert_eq!(models[0]["cached"], false);
    assert_eq!(models[1]["has_checksum"], false);
}

#[tokio::test]
async fn test_ensure_downloads_then_hits_cache() {
    let (server, mock, temp_dir) = create_test_server(u64::MAX).await;

    let response = server.post("/models/transcription/ensure").await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["name"], "whisper-small");
    let cached_path = body["local_path"].as_str().unwrap().to_string();
    assert!(cached_path.starts_with(temp_dir.path().join("cache").to_str().unwrap()));
    assert_eq!(std::fs::read_to_string(&cached_path).unwrap(), WHISPER_BODY);

    let response = server.post("/models/transcription/ensure").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["local_path"], cached_path.as_str());

    // Second call is served from the cache
    let requests = mock.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let models: Vec<serde_json::Value> = server.get("/models").await.json();
    assert_eq!(models[0]["cached"], true);
}

#[tokio::test]
async fn test_ensure_unknown_kind_is_bad_request() {
    let (server, _mock, _temp_dir) = create_test_server(u64::MAX).await;

    let response = server.post("/models/translation/ensure").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_ensure_insufficient_space() {
    let (server, mock, _temp_dir) = create_test_server(10).await;

    let response = server.post("/models/summarization/ensure").await;
    assert_eq!(response.status_code(), 507);

    let body: serde_json::Value = response.json();
    assert_eq!(body["category"], "space");
    assert!(body["error"].as_str().unwrap().contains("bart-large-cnn"));

    // No network traffic and nothing cached
    assert!(mock.received_requests().await.unwrap().is_empty());
    let cache: serde_json::Value = server.get("/cache").await.json();
    assert_eq!(cache["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_ensure_checksum_mismatch_is_conflict() {
    let (server, mock, temp_dir) = create_test_server(u64::MAX).await;

    // Serve different bytes than the catalog checksum expects
    mock.reset().await;
    Mock::given(method("GET"))
        .and(path("/ggml-small.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("tampered"))
        .mount(&mock)
        .await;

    let response = server.post("/models/transcription/ensure").await;
    assert_eq!(response.status_code(), 409);

    let body: serde_json::Value = response.json();
    assert_eq!(body["category"], "integrity");
    assert!(!temp_dir.path().join("models/ggml-small.bin").exists());
}

#[tokio::test]
async fn test_ensure_upstream_error_is_bad_gateway() {
    let (server, mock, _temp_dir) = create_test_server(u64::MAX).await;

    mock.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;

    let response = server.post("/models/summarization/ensure").await;
    assert_eq!(response.status_code(), 502);

    let body: serde_json::Value = response.json();
    assert_eq!(body["category"], "network");
}

#[tokio::test]
async fn test_preload_reports_every_model() {
    let (server, _mock, _temp_dir) = create_test_server(u64::MAX).await;

    let response = server.post("/models/preload").await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["ready"], 2);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["models"].as_array().unwrap().len(), 2);

    let cache: serde_json::Value = server.get("/cache").await.json();
    assert_eq!(cache["entries"].as_array().unwrap().len(), 2);
    assert_eq!(
        cache["total_bytes"],
        (WHISPER_BODY.len() + BART_BODY.len()) as u64
    );
}

#[tokio::test]
async fn test_remove_cache_entry() {
    let (server, _mock, _temp_dir) = create_test_server(u64::MAX).await;

    let body: serde_json::Value = server.post("/models/summarization/ensure").await.json();
    let cached_path = body["local_path"].as_str().unwrap().to_string();

    let response = server.delete("/cache/bart-large-cnn").await;
    assert_eq!(response.status_code(), 204);
    assert!(!Path::new(&cached_path).exists());

    let response = server.delete("/cache/bart-large-cnn").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_clear_cache() {
    let (server, _mock, temp_dir) = create_test_server(u64::MAX).await;

    server.post("/models/preload").await;

    let response = server.delete("/cache").await;
    assert_eq!(response.status_code(), 204);

    let cache: serde_json::Value = server.get("/cache").await.json();
    assert_eq!(cache["entries"].as_array().unwrap().len(), 0);
    assert_eq!(cache["total_bytes"], 0);

    // The index file survives, emptied
    let index = std::fs::read_to_string(temp_dir.path().join("cache/index.json")).unwrap();
    let index: serde_json::Value = serde_json::from_str(&index).unwrap();
    assert_eq!(index["entries"].as_array().unwrap().len(), 0);
}
