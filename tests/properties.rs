//! Property-based checks for the testable invariants: memory never exceeds
//! its configured bound after cleanup, and percentage rollout stays uniform
//! across arbitrary user-id distributions.

use std::collections::HashSet;

use navcache::cache::memory::MemoryStore;
use navcache::config::{ConfigManager, EvalContext, FeatureFlagConfig, InMemoryOverrideStore};
use navcache::core::entry::{ContentType, Entry, EntryMetadata, PageType};
use proptest::prelude::*;

fn entry(route: &str, priority: f64, size: usize) -> Entry<Vec<u8>> {
    Entry {
        data: vec![0u8; 1],
        timestamp: 0,
        expires_at: 1_000_000_000,
        priority,
        size_bytes: size,
        tags: Entry::<Vec<u8>>::derived_tags(route, PageType::Other, ContentType::Generic),
        stale: false,
        metadata: EntryMetadata::new(route, PageType::Other, ContentType::Generic, 0),
    }
}

proptest! {
    /// Invariant 1: after `evict(target, ...)` with no protected routes and
    /// at least one unpinned entry reachable, total bytes never exceeds the
    /// configured bound.
    #[test]
    fn memory_size_bound_holds_after_eviction(
        sizes in prop::collection::vec(1usize..200, 1..30),
        bound in 100usize..2_000,
    ) {
        let store: MemoryStore<Vec<u8>> = MemoryStore::new(bound, 60_000);
        for (i, size) in sizes.iter().enumerate() {
            // priority kept below the pinned threshold (80.0) so eviction
            // can always make progress toward the bound.
            store.set(format!("k{i}"), entry(&format!("/r{i}"), 20.0, *size));
        }
        let _ = store.evict(bound, &HashSet::new());
        prop_assert!(store.total_bytes() <= bound);
    }

    /// Invariant 4: percentage rollout lands within a statistical band of
    /// the configured percentage across randomly generated user-id pools.
    #[test]
    fn rollout_percentage_is_uniform_across_id_pools(
        percentage in 1u8..100,
        pool_size in 200usize..2_000,
        seed in any::<u32>(),
    ) {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(FeatureFlagConfig::new("flag", false).with_rollout(percentage));

        let enabled = (0..pool_size)
            .filter(|i| {
                let context = EvalContext {
                    user_id: Some(format!("user-{seed}-{i}")),
                    user_groups: None,
                    environment: "production".to_string(),
                    session_id: None,
                };
                manager.evaluate("flag", &context)
            })
            .count();

        let fraction = enabled as f64 / pool_size as f64;
        let target = percentage as f64 / 100.0;
        // Generous band: small pools and extreme percentages have higher
        // sampling variance, so this checks direction and rough magnitude
        // rather than tight convergence.
        prop_assert!(
            (fraction - target).abs() < 0.15,
            "fraction {fraction} drifted too far from target {target} (pool_size={pool_size})"
        );
    }

    /// Evaluation is a pure function of (flag config, context): the same
    /// inputs always produce the same verdict.
    #[test]
    fn rollout_evaluation_is_deterministic(user_id in "[a-z0-9]{1,16}", percentage in 0u8..=100) {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(FeatureFlagConfig::new("flag", false).with_rollout(percentage));
        let context = EvalContext {
            user_id: Some(user_id),
            user_groups: None,
            environment: "production".to_string(),
            session_id: None,
        };
        let first = manager.evaluate("flag", &context);
        for _ in 0..5 {
            prop_assert_eq!(manager.evaluate("flag", &context), first);
        }
    }
}
