//! Property-based tests using proptest
//!
//! These tests verify cache invariants across randomized inputs: the size
//! ceiling, LRU victim order and eviction idempotence.

use model_manager::cache::{CacheEntry, CacheIndex, EvictionPolicy, ManualClock};
use model_manager::config::ManagerConfig;
use model_manager::storage::FileSystemStorage;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Arbitrary Implementations
// =============================================================================

/// Generate a cache index of up to 12 entries
fn arb_entries() -> impl Strategy<Value = BTreeMap<String, CacheEntry>> {
    prop::collection::btree_map(
        "[a-z]{1,8}",
        (0i64..1_000, 0u64..1_000).prop_map(|(last_used_ms, size_bytes)| CacheEntry {
            cached_path: PathBuf::from("/cache/artifact"),
            last_used_ms,
            size_bytes,
            version: "1".to_string(),
        }),
        0..12,
    )
}

fn policy(max_total_bytes: u64) -> EvictionPolicy {
    EvictionPolicy::new(max_total_bytes, Duration::from_secs(86_400))
}

fn total(entries: &BTreeMap<String, CacheEntry>) -> u64 {
    entries.values().map(|e| e.size_bytes).sum()
}

fn without(
    entries: &BTreeMap<String, CacheEntry>,
    victims: &[String],
) -> BTreeMap<String, CacheEntry> {
    entries
        .iter()
        .filter(|(name, _)| !victims.contains(name))
        .map(|(name, entry)| (name.clone(), entry.clone()))
        .collect()
}

// =============================================================================
// Eviction Policy Properties
// =============================================================================

proptest! {
    /// Evicting the selected victims always brings the total under the ceiling
    #[test]
    fn eviction_respects_ceiling(entries in arb_entries(), max in 0u64..5_000) {
        let policy = policy(max);
        let victims = policy.select_victims(&entries);
        let survivors = without(&entries, &victims);

        prop_assert!(total(&survivors) <= max);
    }

    /// Nothing is evicted while the cache fits
    #[test]
    fn no_eviction_under_ceiling(entries in arb_entries()) {
        let policy = policy(total(&entries));
        prop_assert!(policy.select_victims(&entries).is_empty());
    }

    /// A second eviction pass over the survivors is a no-op
    #[test]
    fn eviction_is_idempotent(entries in arb_entries(), max in 0u64..5_000) {
        let policy = policy(max);
        let victims = policy.select_victims(&entries);
        let survivors = without(&entries, &victims);

        prop_assert!(policy.select_victims(&survivors).is_empty());
    }

    /// Every victim was used no later than every survivor
    #[test]
    fn victims_are_least_recently_used(entries in arb_entries(), max in 0u64..5_000) {
        let policy = policy(max);
        let victims = policy.select_victims(&entries);
        let survivors = without(&entries, &victims);

        let newest_victim = victims.iter().map(|name| entries[name].last_used_ms).max();
        let oldest_survivor = survivors.values().map(|e| e.last_used_ms).min();

        if let (Some(newest_victim), Some(oldest_survivor)) = (newest_victim, oldest_survivor) {
            prop_assert!(newest_victim <= oldest_survivor);
        }
    }

    /// Eviction stops as soon as the total fits
    #[test]
    fn eviction_is_minimal(entries in arb_entries(), max in 0u64..5_000) {
        let policy = policy(max);
        let victims = policy.select_victims(&entries);

        if let Some((_, spared)) = victims.split_last() {
            let survivors = without(&entries, spared);
            prop_assert!(total(&survivors) > max);
        }
    }
}

// =============================================================================
// Cache Index Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Inserting any sequence of artifacts keeps the index under its ceiling
    /// and keeps index and directory in agreement
    #[test]
    fn index_stays_under_ceiling(
        sizes in prop::collection::vec(1usize..400, 1..8),
        max in 100u64..1_000,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let clock = Arc::new(ManualClock::new(0));
            let cache = CacheIndex::open_with(
                temp_dir.path().join("cache"),
                policy(max),
                Arc::new(FileSystemStorage::new()),
                clock.clone(),
            )
            .await
            .unwrap();

            for (i, size) in sizes.iter().enumerate() {
                let source = temp_dir.path().join(format!("model-{}.bin", i));
                std::fs::write(&source, vec![0u8; *size]).unwrap();
                clock.advance(1_000);

                cache
                    .insert(&format!("model-{}", i), &source, *size as u64, "1")
                    .await
                    .unwrap();

                assert!(cache.total_bytes().await <= max);
            }

            for (_, entry) in cache.entries().await {
                assert!(entry.cached_path.exists());
            }
            assert!(cache.evict().await.is_empty());
        });
    }
}

// =============================================================================
// Config Properties
// =============================================================================

proptest! {
    /// Any unprivileged port with non-zero limits is a valid config
    #[test]
    fn config_with_sane_limits_validates(
        port in 1024u16..,
        max_cache_bytes in 1u64..,
        max_age_days in 1u64..3650,
        download_timeout_secs in 1u64..86_400,
    ) {
        let config = ManagerConfig {
            api_port: port,
            max_cache_bytes,
            max_age_days,
            download_timeout_secs,
            ..Default::default()
        };
        prop_assert!(config.validate().is_ok());
        prop_assert_eq!(config.eviction_policy().max_total_bytes, max_cache_bytes);
    }

    /// Privileged ports are always rejected
    #[test]
    fn config_rejects_privileged_port(port in 0u16..1024) {
        let config = ManagerConfig {
            api_port: port,
            ..Default::default()
        };
        prop_assert!(config.validate().is_err());
    }
}
