//! navcache demo
//!
//! Exercises the cache, scheduler, config, and worker subsystems end to
//! end against a scratch on-disk store, logging each step.

use std::panic;

use navcache::cache::manager::CacheManager;
use navcache::config::{ConfigManager, EvalContext, FeatureFlagConfig, InMemoryOverrideStore};
use navcache::core::entry::{ContentType, PageType};
use navcache::worker::{FetchRequest, WorkerRouting};
use navcache::CacheOptions;

fn main() -> anyhow::Result<()> {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("navcache fatal error:");
        eprintln!("{panic_info}");
        if let Some(location) = panic_info.location() {
            eprintln!("location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("navcache v{}", navcache::VERSION);

    let mut db_path = std::env::temp_dir();
    db_path.push(format!("navcache-demo-{}", std::process::id()));

    let manager: CacheManager<String> = CacheManager::new(CacheOptions::default(), &db_path);

    log::info!("writing /dashboard page data to cache");
    manager.set(
        "page:/dashboard",
        "{\"widgets\":[]}".to_string(),
        "/dashboard",
        PageType::Dashboard,
        ContentType::UserGenerated,
        None,
        64,
    )?;

    match manager.get("page:/dashboard")? {
        Some(entry) => log::info!("cache hit: priority={:.1} tags={:?}", entry.priority, entry.tags),
        None => log::warn!("unexpected cache miss on the entry just written"),
    }

    log::info!("invalidating by tag route:/dashboard");
    manager.invalidate(navcache::InvalidateTarget::Tags(vec!["route:/dashboard".to_string()]))?;
    log::info!("post-invalidate lookup: {:?}", manager.get("page:/dashboard")?.is_some());

    log::info!("simulating offline mode");
    manager.set_offline_mode(true);
    if let Some(quota) = manager.check_storage_quota() {
        log::info!("storage quota: {:.1}% of {} bytes used", quota.percentage, quota.quota);
    }

    let config_manager = ConfigManager::new(Box::new(InMemoryOverrideStore::default()));
    config_manager.register(FeatureFlagConfig::new("cache-warming", false).with_rollout(50));
    let context = EvalContext {
        user_id: Some("user-42".to_string()),
        user_groups: None,
        environment: "production".to_string(),
        session_id: None,
    };
    log::info!(
        "feature flag cache-warming for user-42: {}",
        config_manager.evaluate("cache-warming", &context)
    );

    let routing = WorkerRouting::default();
    let request = FetchRequest {
        method: "GET".to_string(),
        path: "/dashboard".to_string(),
        same_origin: true,
        query: Default::default(),
        is_navigation: true,
    };
    log::info!("fetch strategy for GET /dashboard: {:?}", navcache::worker::classify(&request, &routing));

    let _ = std::fs::remove_dir_all(&db_path);
    log::info!("navcache demo complete");
    Ok(())
}
