//! Persisted cache index
//!
//! The index is the single source of truth for what lives in the cache
//! directory. Every mutation runs under one lock and is persisted before the
//! lock is released, so a crash never loses more than the operation in flight.

use super::eviction::EvictionPolicy;
use super::{Clock, SystemClock};
use crate::checksum::digest_str;
use crate::storage::{FileSystemStorage, StorageBackend};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tempfile::TempPath;
use tokio::sync::Mutex;

pub const INDEX_FILE_NAME: &str = "index.json";
const INDEX_FORMAT_VERSION: u32 = 1;
const STAGING_PREFIX: &str = ".staging-";

/// Metadata for one artifact materialized in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cached_path: PathBuf,
    /// Epoch milliseconds of the last cache hit or insertion
    pub last_used_ms: i64,
    pub size_bytes: u64,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    name: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    entries: Vec<IndexRecord>,
}

/// Durable mapping of model name to cache entry
pub struct CacheIndex {
    cache_dir: PathBuf,
    index_file: PathBuf,
    policy: EvictionPolicy,
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl CacheIndex {
    /// Open the cache in `cache_dir`, creating it if needed, and load the index
    ///
    /// Failing to create the directory is fatal for the whole cache and is
    /// returned as an error. A missing or corrupt index is not.
    pub async fn open(cache_dir: impl Into<PathBuf>, policy: EvictionPolicy) -> Result<Self> {
        Self::open_with(
            cache_dir,
            policy,
            Arc::new(FileSystemStorage::new()),
            Arc::new(SystemClock),
        )
        .await
    }

    /// Open with a custom storage backend and clock
    pub async fn open_with(
        cache_dir: impl Into<PathBuf>,
        policy: EvictionPolicy,
        storage: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .await
            .with_context(|| format!("Cannot create cache directory: {:?}", cache_dir))?;
        sweep_staging_files(&cache_dir).await;

        let index = Self {
            index_file: cache_dir.join(INDEX_FILE_NAME),
            cache_dir,
            policy,
            storage,
            clock,
            entries: Mutex::new(BTreeMap::new()),
        };
        index.load().await;

        Ok(index)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Replace the in-memory index with the persisted one
    ///
    /// Missing or unreadable storage resets the index to empty.
    /// Returns the number of entries loaded.
    pub async fn load(&self) -> usize {
        let loaded = match self.storage.load(&self.index_file).await {
            Ok(Some(content)) => match serde_json::from_str::<PersistedIndex>(&content) {
                Ok(persisted) => persisted
                    .entries
                    .into_iter()
                    .map(|record| (record.name, record.entry))
                    .collect(),
                Err(e) => {
                    tracing::warn!(
                        path = ?self.index_file,
                        error = %e,
                        "Cache index is corrupted, starting with an empty cache"
                    );
                    BTreeMap::new()
                }
            },
            Ok(None) => {
                tracing::info!(path = ?self.index_file, "No cache index found, starting fresh");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = ?self.index_file,
                    error = %e,
                    "Failed to read cache index, starting with an empty cache"
                );
                BTreeMap::new()
            }
        };

        let count = loaded.len();
        let mut entries = self.entries.lock().await;
        *entries = loaded;
        crate::metrics::update_cache_bytes(total_of(&entries));

        tracing::debug!(entries = count, "Cache index loaded");
        count
    }

    /// Persist the full in-memory index
    pub async fn save(&self) -> Result<()> {
        let entries = self.entries.lock().await;
        self.persist(&entries).await
    }

    /// Look up a live, unexpired entry
    ///
    /// An entry whose file vanished is dropped from the index. An entry unused
    /// for longer than the max age is dropped together with its file.
    pub async fn lookup(&self, name: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get(name)?.clone();

        if !file_exists(&entry.cached_path).await {
            tracing::info!(
                model = %name,
                path = ?entry.cached_path,
                "Cached file missing, dropping stale entry"
            );
            entries.remove(name);
            self.persist_or_log(&entries).await;
            return None;
        }

        if self.policy.is_expired(&entry, self.clock.now_ms()) {
            tracing::info!(
                model = %name,
                last_used_ms = entry.last_used_ms,
                "Cache entry expired"
            );
            delete_artifact(&entry.cached_path).await;
            entries.remove(name);
            crate::metrics::record_eviction(name, "expired");
            self.persist_or_log(&entries).await;
            return None;
        }

        Some(entry)
    }

    /// Mark an entry as used now
    ///
    /// Returns false if there is no entry for `name`.
    pub async fn touch(&self, name: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now_ms();

        match entries.get_mut(name) {
            Some(entry) => {
                entry.last_used_ms = now;
                self.persist_or_log(&entries).await;
                true
            }
            None => false,
        }
    }

    /// Copy an artifact into the cache and record it
    ///
    /// The artifact is staged in a uniquely named, synced file in the cache
    /// directory. The index is persisted first and the staged file is then
    /// renamed over the name derived from `(name, version)`, so a failed save
    /// leaves both the previous record and the previous bytes untouched.
    /// Eviction runs afterwards; the returned entry is `None` if the new
    /// artifact itself was evicted.
    pub async fn insert(
        &self,
        name: &str,
        source: &Path,
        size_bytes: u64,
        version: &str,
    ) -> Result<Option<CacheEntry>> {
        let cached_path = self.artifact_path(name, version, source);

        let staged = if source != cached_path {
            Some(stage_copy(source, &self.cache_dir).await?)
        } else {
            None
        };

        let mut entries = self.entries.lock().await;

        let entry = CacheEntry {
            cached_path: cached_path.clone(),
            last_used_ms: self.clock.now_ms(),
            size_bytes,
            version: version.to_string(),
        };

        let mut updated = entries.clone();
        let previous = updated.insert(name.to_string(), entry);

        // On failure the staged copy is dropped and removed
        self.persist(&updated).await?;

        if let Some(staged) = staged
            && let Err(e) = staged.persist(&cached_path)
        {
            self.persist_or_log(&entries).await;
            return Err(e.error)
                .with_context(|| format!("Failed to move cached file into place: {:?}", cached_path));
        }
        *entries = updated;

        if let Some(previous) = previous
            && previous.cached_path != cached_path
        {
            delete_artifact(&previous.cached_path).await;
        }

        tracing::info!(
            model = %name,
            version = %version,
            size_bytes = size_bytes,
            path = ?cached_path,
            "Cached model artifact"
        );

        self.evict_locked(&mut entries).await;

        Ok(entries.get(name).cloned())
    }

    /// Remove an entry and its file
    ///
    /// Returns false if there was no entry for `name`.
    pub async fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.lock().await;

        match entries.remove(name) {
            Some(entry) => {
                delete_artifact(&entry.cached_path).await;
                self.persist_or_log(&entries).await;
                tracing::info!(model = %name, "Removed cache entry");
                true
            }
            None => false,
        }
    }

    /// Remove every entry and file, leaving an empty persisted index
    ///
    /// Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let removed = entries.len();

        for entry in entries.values() {
            delete_artifact(&entry.cached_path).await;
        }
        entries.clear();

        self.persist(&entries).await?;

        tracing::info!(removed = removed, "Model cache cleared");
        Ok(removed)
    }

    /// Run the eviction policy over the current index
    ///
    /// Returns the names evicted; a no-op when the cache is under its ceiling.
    pub async fn evict(&self) -> Vec<String> {
        let mut entries = self.entries.lock().await;
        self.evict_locked(&mut entries).await
    }

    /// Snapshot of all entries, sorted by name
    pub async fn entries(&self) -> Vec<(String, CacheEntry)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    pub async fn get(&self, name: &str) -> Option<CacheEntry> {
        self.entries.lock().await.get(name).cloned()
    }

    pub async fn total_bytes(&self) -> u64 {
        total_of(&*self.entries.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Deterministic cache location for an artifact
    pub fn artifact_path(&self, name: &str, version: &str, source: &Path) -> PathBuf {
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let digest = digest_str(&format!("{}@{}", name, version));

        self.cache_dir.join(format!("{}-{}", &digest[..16], base))
    }

    async fn evict_locked(&self, entries: &mut BTreeMap<String, CacheEntry>) -> Vec<String> {
        let victims = self.policy.select_victims(entries);

        for name in &victims {
            if let Some(entry) = entries.remove(name) {
                tracing::info!(
                    model = %name,
                    size_bytes = entry.size_bytes,
                    last_used_ms = entry.last_used_ms,
                    "Evicting cache entry"
                );
                delete_artifact(&entry.cached_path).await;
                crate::metrics::record_eviction(name, "size");
            }
        }

        if !victims.is_empty() {
            self.persist_or_log(entries).await;
        }
        crate::metrics::update_cache_bytes(total_of(entries));

        victims
    }

    async fn persist(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        let persisted = PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            entries: entries
                .iter()
                .map(|(name, entry)| IndexRecord {
                    name: name.clone(),
                    entry: entry.clone(),
                })
                .collect(),
        };

        let content =
            serde_json::to_string_pretty(&persisted).context("Failed to serialize cache index")?;
        self.storage.save(&self.index_file, &content).await?;

        tracing::debug!(
            path = ?self.index_file,
            entries = entries.len(),
            "Cache index saved"
        );

        Ok(())
    }

    async fn persist_or_log(&self, entries: &BTreeMap<String, CacheEntry>) {
        if let Err(e) = self.persist(entries).await {
            tracing::error!(path = ?self.index_file, error = %e, "Failed to save cache index");
        }
    }
}

fn total_of(entries: &BTreeMap<String, CacheEntry>) -> u64 {
    entries.values().map(|e| e.size_bytes).sum()
}

async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Best-effort file deletion; an already missing file counts as deleted
async fn delete_artifact(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Failed to delete cached file");
        }
    }
}

/// Copy `source` into a fresh, synced staging file in `dir`
///
/// The staging file is removed when the returned path is dropped without
/// being persisted.
async fn stage_copy(source: &Path, dir: &Path) -> Result<TempPath> {
    let (file, staged) = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create staging file in {:?}", dir))?
        .into_parts();

    let mut dest = fs::File::from_std(file);
    let mut src = fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open {:?} for caching", source))?;

    tokio::io::copy(&mut src, &mut dest)
        .await
        .with_context(|| format!("Failed to copy {:?} into cache", source))?;
    dest.sync_all()
        .await
        .with_context(|| format!("Failed to sync staged copy of {:?}", source))?;

    Ok(staged)
}

/// Remove staging files left behind by an interrupted insert
async fn sweep_staging_files(dir: &Path) {
    let Ok(mut read_dir) = fs::read_dir(dir).await else {
        return;
    };

    while let Ok(Some(entry)) = read_dir.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            tracing::debug!(path = ?entry.path(), "Removing stale staging file");
            delete_artifact(&entry.path()).await;
        }
    }
}
