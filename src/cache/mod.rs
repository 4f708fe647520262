//! Local model cache
//!
//! Provides:
//! - A persisted index of cached artifacts with recency and size metadata
//! - A size/age bounded LRU eviction policy
//! - Deterministic cache file naming across model versions
//!
//! Cache directory layout:
//! ```text
//! <cache_dir>/
//! ├── index.json
//! ├── 3f2a9c01d4e5b6a7-ggml-small.bin
//! └── 9b1e77c0aa12f3d4-bart-large-cnn.safetensors
//! ```

pub mod eviction;
pub mod index;

pub use eviction::EvictionPolicy;
pub use index::{CacheEntry, CacheIndex, INDEX_FILE_NAME};

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for recency bookkeeping
pub trait Clock: Send + Sync {
    /// Current time as epoch milliseconds
    fn now_ms(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
