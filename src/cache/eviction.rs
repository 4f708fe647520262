//! Size and age bounds over the cache index

use super::index::CacheEntry;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 10 * 1024 * 1024 * 1024;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// LRU eviction policy with a total-size ceiling and a max-age ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_total_bytes: u64,
    pub max_age: Duration,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl EvictionPolicy {
    pub fn new(max_total_bytes: u64, max_age: Duration) -> Self {
        Self {
            max_total_bytes,
            max_age,
        }
    }

    /// Whether an entry has gone unused for longer than `max_age`
    pub fn is_expired(&self, entry: &CacheEntry, now_ms: i64) -> bool {
        let max_age_ms = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(entry.last_used_ms) > max_age_ms
    }

    /// Names to evict, least recently used first, until the total fits
    ///
    /// Entries with equal timestamps are ordered by name. Returns an empty
    /// list when the total is already under the ceiling.
    pub fn select_victims(&self, entries: &BTreeMap<String, CacheEntry>) -> Vec<String> {
        let mut total: u64 = entries.values().map(|e| e.size_bytes).sum();
        if total <= self.max_total_bytes {
            return Vec::new();
        }

        // BTreeMap iterates by name, so a stable sort keeps name order on ties
        let mut by_age: Vec<(&String, &CacheEntry)> = entries.iter().collect();
        by_age.sort_by_key(|(_, entry)| entry.last_used_ms);

        let mut victims = Vec::new();
        for (name, entry) in by_age {
            if total <= self.max_total_bytes {
                break;
            }
            total = total.saturating_sub(entry.size_bytes);
            victims.push(name.clone());
        }

        victims
    }
}
