//! The background execution context's install/activate state machine
//! (§4.H Install, §9: "treat as a state machine `{installing, installed,
//! activating, active}`").

use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Active,
}

pub type PrefetchFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type Prefetcher = Box<dyn Fn(&str) -> PrefetchFuture + Send + Sync>;

pub struct LifecycleConfig {
    pub static_cache_name: String,
    pub dynamic_cache_name: String,
}

/// Prefetches the static-asset list (failure fails install), then
/// opportunistically prefetches a prioritized route list (failure here is
/// logged, not fatal). Returns the new state on success.
pub async fn install(static_assets: &[String], route_list: &[String], prefetcher: &Prefetcher) -> Result<LifecycleState, String> {
    for asset in static_assets {
        if let Err(err) = prefetcher(asset).await {
            log::error!("install failed: static asset {asset} could not be prefetched: {err}");
            return Err(format!("static asset prefetch failed for {asset}: {err}"));
        }
    }

    for route in route_list {
        if let Err(err) = prefetcher(route).await {
            log::warn!("opportunistic prefetch failed for {route}: {err}");
        }
    }

    Ok(LifecycleState::Installed)
}

/// Claims clients and deletes any existing cache name that does not match
/// the configured static/dynamic names.
pub fn activate(config: &LifecycleConfig, existing_cache_names: &[String], mut delete_cache: impl FnMut(&str)) -> LifecycleState {
    for name in existing_cache_names {
        if name != &config.static_cache_name && name != &config.dynamic_cache_name {
            log::info!("activate: deleting stale cache {name}");
            delete_cache(name);
        }
    }
    LifecycleState::Active
}
