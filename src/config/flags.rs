//! Deterministic per-user feature evaluation with targeting, percentage
//! rollout, environment overrides, and manual overrides (§4.G
//! ConfigManager / FeatureFlags).
//!
//! Decision-order evaluation is grounded on
//! `enterprise::auth::policy::PolicyEngine::evaluate`'s first-match-wins
//! loop and per-context cache; the override store is the injectable
//! storage interface called for in §9's design notes.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlagConfig {
    pub flag: String,
    pub default_enabled: bool,
    pub rollout_percentage: u8,
    pub target_user_ids: Option<HashSet<String>>,
    pub target_groups: Option<HashSet<String>>,
    pub environment_overrides: Option<HashMap<String, bool>>,
    pub description: String,
}

impl FeatureFlagConfig {
    pub fn new(flag: impl Into<String>, default_enabled: bool) -> Self {
        FeatureFlagConfig {
            flag: flag.into(),
            default_enabled,
            rollout_percentage: 0,
            target_user_ids: None,
            target_groups: None,
            environment_overrides: None,
            description: String::new(),
        }
    }

    pub fn with_rollout(mut self, percentage: u8) -> Self {
        self.rollout_percentage = percentage.min(100);
        self
    }

    pub fn with_target_users(mut self, users: HashSet<String>) -> Self {
        self.target_user_ids = Some(users);
        self
    }

    pub fn with_target_groups(mut self, groups: HashSet<String>) -> Self {
        self.target_groups = Some(groups);
        self
    }

    pub fn with_environment_override(mut self, env: impl Into<String>, enabled: bool) -> Self {
        self.environment_overrides
            .get_or_insert_with(HashMap::new)
            .insert(env.into(), enabled);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub user_id: Option<String>,
    pub user_groups: Option<HashSet<String>>,
    pub environment: String,
    pub session_id: Option<String>,
}

/// Per-user persisted override, reified as an injectable collaborator so
/// `ConfigManager` never hard-codes a storage engine (§9 design notes).
pub trait FlagOverrideStore: Send + Sync {
    fn get_override(&self, flag: &str) -> Option<bool>;
    fn set_override(&self, flag: &str, value: bool);
    fn clear_override(&self, flag: &str);
}

/// `sled`-backed override store, durable across process restart.
pub struct SledOverrideStore {
    tree: Option<sled::Tree>,
}

impl SledOverrideStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        match sled::open(path.as_ref()).and_then(|db| db.open_tree("flag-overrides")) {
            Ok(tree) => SledOverrideStore { tree: Some(tree) },
            Err(err) => {
                log::error!("flag override store unavailable: {err}");
                SledOverrideStore { tree: None }
            }
        }
    }
}

impl FlagOverrideStore for SledOverrideStore {
    fn get_override(&self, flag: &str) -> Option<bool> {
        let tree = self.tree.as_ref()?;
        let raw = tree.get(format!("flag:{flag}")).ok()??;
        Some(raw.as_ref() == [1u8])
    }

    fn set_override(&self, flag: &str, value: bool) {
        if let Some(tree) = &self.tree {
            let _ = tree.insert(format!("flag:{flag}"), &[value as u8]);
        }
    }

    fn clear_override(&self, flag: &str) {
        if let Some(tree) = &self.tree {
            let _ = tree.remove(format!("flag:{flag}"));
        }
    }
}

/// In-memory override store for tests and short-lived processes.
#[derive(Default)]
pub struct InMemoryOverrideStore {
    overrides: DashMap<String, bool>,
}

impl FlagOverrideStore for InMemoryOverrideStore {
    fn get_override(&self, flag: &str) -> Option<bool> {
        self.overrides.get(flag).map(|v| *v)
    }

    fn set_override(&self, flag: &str, value: bool) {
        self.overrides.insert(flag.to_string(), value);
    }

    fn clear_override(&self, flag: &str) {
        self.overrides.remove(flag);
    }
}

/// Non-cryptographic 32-bit FNV-1a hash, deterministic and uniform enough
/// for percentage-rollout bucketing (§4.G step 5 explicitly excludes a
/// cryptographic hash).
fn fnv1a_32(input: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in input.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

pub struct ConfigManager {
    flags: DashMap<String, FeatureFlagConfig>,
    override_store: Box<dyn FlagOverrideStore>,
}

impl ConfigManager {
    pub fn new(override_store: Box<dyn FlagOverrideStore>) -> Self {
        ConfigManager {
            flags: DashMap::new(),
            override_store,
        }
    }

    pub fn register(&self, config: FeatureFlagConfig) {
        self.flags.insert(config.flag.clone(), config);
    }

    pub fn set_override(&self, flag: &str, value: bool) {
        self.override_store.set_override(flag, value);
    }

    pub fn clear_override(&self, flag: &str) {
        self.override_store.clear_override(flag);
    }

    /// First-match-wins decision order per §4.G.
    pub fn evaluate(&self, flag: &str, context: &EvalContext) -> bool {
        if let Some(overridden) = self.override_store.get_override(flag) {
            return overridden;
        }

        let Some(config) = self.flags.get(flag) else {
            log::warn!("evaluating unregistered flag {flag}, defaulting to false");
            return false;
        };

        if let (Some(ids), Some(user_id)) = (&config.target_user_ids, &context.user_id) {
            if ids.contains(user_id) {
                return true;
            }
        }

        if let (Some(groups), Some(user_groups)) = (&config.target_groups, &context.user_groups) {
            if !groups.is_disjoint(user_groups) {
                return true;
            }
        }

        if let Some(overrides) = &config.environment_overrides {
            if let Some(enabled) = overrides.get(&context.environment) {
                return *enabled;
            }
        }

        let bucket_id = context.user_id.as_deref().or(context.session_id.as_deref());
        if let Some(id) = bucket_id {
            let hash = fnv1a_32(&format!("{flag}{id}"));
            return (hash % 100) < config.rollout_percentage as u32;
        }

        config.default_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(user_id: &str, env: &str) -> EvalContext {
        EvalContext {
            user_id: Some(user_id.to_string()),
            user_groups: None,
            environment: env.to_string(),
            session_id: None,
        }
    }

    #[test]
    fn manual_override_short_circuits_everything() {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(FeatureFlagConfig::new("f", false).with_rollout(0));
        manager.set_override("f", true);
        assert!(manager.evaluate("f", &ctx("u1", "production")));
    }

    #[test]
    fn target_user_ids_win_over_rollout() {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(
            FeatureFlagConfig::new("f", false)
                .with_rollout(0)
                .with_target_users(["u1".to_string()].into_iter().collect()),
        );
        assert!(manager.evaluate("f", &ctx("u1", "production")));
        assert!(!manager.evaluate("f", &ctx("u2", "production")));
    }

    #[test]
    fn environment_override_applies_when_no_targeting_matches() {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(
            FeatureFlagConfig::new("f", false)
                .with_rollout(0)
                .with_environment_override("staging", true),
        );
        assert!(manager.evaluate("f", &ctx("u1", "staging")));
        assert!(!manager.evaluate("f", &ctx("u1", "production")));
    }

    #[test]
    fn evaluation_is_deterministic_across_calls() {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(FeatureFlagConfig::new("f", false).with_rollout(50));
        let context = ctx("u1", "production");
        let first = manager.evaluate("f", &context);
        for _ in 0..10 {
            assert_eq!(manager.evaluate("f", &context), first);
        }
    }

    #[test]
    fn percentage_rollout_is_roughly_uniform() {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(FeatureFlagConfig::new("cache-warming", false).with_rollout(50));
        let enabled = (0..1000)
            .filter(|i| manager.evaluate("cache-warming", &ctx(&format!("user-{i}"), "production")))
            .count();
        let fraction = enabled as f64 / 1000.0;
        assert!((0.35..=0.65).contains(&fraction), "fraction was {fraction}");
    }

    #[test]
    fn falls_back_to_session_id_when_no_user_id() {
        let manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
        manager.register(FeatureFlagConfig::new("f", false).with_rollout(100));
        let context = EvalContext {
            user_id: None,
            user_groups: None,
            environment: "production".to_string(),
            session_id: Some("s1".to_string()),
        };
        assert!(manager.evaluate("f", &context));
    }
}
