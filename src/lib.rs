//! Model Manager - Model cache and acquisition service
//!
//! Keeps local ML model artifacts available on demand: an on-disk LRU cache
//! with size and age limits, checksum verification, deadline-bounded
//! downloads and a catalog of known models.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod disk;
pub mod download;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod storage;

pub use cache::{CacheEntry, CacheIndex, EvictionPolicy};
pub use catalog::{ModelCatalog, ModelDescriptor, ModelKind};
pub use config::ManagerConfig;
pub use download::{DownloadError, Downloader, HttpFetcher};
pub use error::{AcquireError, FailureCategory};
pub use model::ModelHandle;
pub use orchestrator::{AcquisitionState, ModelAcquirer, PreloadReport};
