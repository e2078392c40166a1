//! Configuration surface and feature-flag evaluation (§4.G, §6).

pub mod flags;
pub mod options;

pub use flags::{ConfigManager, EvalContext, FeatureFlagConfig, FlagOverrideStore, InMemoryOverrideStore, SledOverrideStore};
pub use options::CacheOptions;
