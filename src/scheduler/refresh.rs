//! Schedules, deduplicates, retries, and defers background revalidations
//! (§4.F RefreshScheduler).
//!
//! Grounded on `scheduling::queue::JobQueue::fail_job`'s exponential-backoff
//! re-enqueue (`2_i64.pow(retry_count) * 60`) and on
//! `scheduling::scheduler::JobPriority`; the per-route "one in-flight
//! execution" guard is the idiomatic-Rust analog of the teacher's
//! Redis-backed dedup keys, expressed here with a task table plus an
//! `executing` flag per route instead of a distributed lock.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::core::entry::{ContentType, PageType};

pub type RefreshFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;
pub type RefreshCallback<T> = Arc<dyn Fn() -> RefreshFuture<T> + Send + Sync>;
pub type UpdateCallback<T> = Arc<dyn Fn(T) + Send + Sync>;
/// Invoked on every successful refresh so the caller can write the fresh
/// data through to the cache (§4.F: "`CacheManager.set(key(route), ...)`").
pub type WriteThroughHook<T> = Arc<dyn Fn(&str, T) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub interaction_defer_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            interaction_defer_delay_ms: 2_000,
        }
    }
}

struct TaskState<T> {
    callback: RefreshCallback<T>,
    update_callback: Option<UpdateCallback<T>>,
    #[allow(dead_code)]
    page_type: Option<PageType>,
    #[allow(dead_code)]
    content_type: Option<ContentType>,
    retry_count: AtomicU32,
    executing: AtomicBool,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    /// Bumped every time `scheduleRefresh` replaces this route's task so an
    /// in-flight retry chain started against a stale task generation quietly
    /// stops rescheduling itself instead of fighting the new one.
    generation: AtomicU32,
}

pub struct RefreshScheduler<T> {
    tasks: DashMap<String, Arc<TaskState<T>>>,
    deferred: DashMap<String, ()>,
    user_interacting: AtomicBool,
    interaction_wait: Mutex<Option<JoinHandle<()>>>,
    config: RefreshConfig,
    write_through: WriteThroughHook<T>,
}

impl<T: Send + Clone + 'static> RefreshScheduler<T> {
    pub fn new(config: RefreshConfig, write_through: WriteThroughHook<T>) -> Arc<Self> {
        Arc::new(RefreshScheduler {
            tasks: DashMap::new(),
            deferred: DashMap::new(),
            user_interacting: AtomicBool::new(false),
            interaction_wait: Mutex::new(None),
            config,
            write_through,
        })
    }

    /// Cancels any existing task for `route`, installs a fresh one, and
    /// executes immediately unless the user is currently interacting.
    pub fn schedule_refresh(
        self: &Arc<Self>,
        route: &str,
        callback: RefreshCallback<T>,
        page_type: Option<PageType>,
        content_type: Option<ContentType>,
        update_callback: Option<UpdateCallback<T>>,
    ) {
        self.cancel_refresh(route);

        let task = Arc::new(TaskState {
            callback,
            update_callback,
            page_type,
            content_type,
            retry_count: AtomicU32::new(0),
            executing: AtomicBool::new(false),
            timer_handle: Mutex::new(None),
            generation: AtomicU32::new(0),
        });
        self.tasks.insert(route.to_string(), task.clone());

        if self.user_interacting.load(Ordering::Relaxed) {
            self.deferred.insert(route.to_string(), ());
        } else {
            self.spawn_execution(route.to_string(), task, 0);
        }
    }

    pub fn cancel_refresh(&self, route: &str) {
        if let Some((_, task)) = self.tasks.remove(route) {
            if let Some(handle) = task.timer_handle.lock().take() {
                handle.abort();
            }
        }
        self.deferred.remove(route);
    }

    /// On a true→false transition, waits `interactionDeferDelay` then
    /// executes all deferred tasks. Transitioning back to `true` cancels
    /// that wait.
    pub fn set_user_interacting(self: &Arc<Self>, interacting: bool) {
        let was_interacting = self.user_interacting.swap(interacting, Ordering::Relaxed);

        if interacting {
            if let Some(handle) = self.interaction_wait.lock().take() {
                handle.abort();
            }
            return;
        }

        if !was_interacting {
            return;
        }

        let scheduler = self.clone();
        let delay = Duration::from_millis(self.config.interaction_defer_delay_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.run_deferred();
        });
        *self.interaction_wait.lock() = Some(handle);
    }

    fn run_deferred(self: &Arc<Self>) {
        let routes: Vec<String> = self.deferred.iter().map(|item| item.key().clone()).collect();
        for route in routes {
            self.deferred.remove(&route);
            if let Some(task) = self.tasks.get(&route).map(|t| t.clone()) {
                let generation = task.generation.load(Ordering::Relaxed);
                self.spawn_execution(route, task, generation);
            }
        }
    }

    fn spawn_execution(self: &Arc<Self>, route: String, task: Arc<TaskState<T>>, generation: u32) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.execute(route, task, generation).await;
        });
    }

    async fn execute(self: Arc<Self>, route: String, task: Arc<TaskState<T>>, generation: u32) {
        if task.generation.load(Ordering::Relaxed) != generation {
            return;
        }
        // Only one execution per route at a time; a concurrent trigger for
        // the same generation simply skips rather than queuing a second run.
        if task.executing.swap(true, Ordering::AcqRel) {
            return;
        }

        let result = (task.callback)().await;
        task.executing.store(false, Ordering::Release);

        match result {
            Ok(data) => {
                task.retry_count.store(0, Ordering::Relaxed);
                (self.write_through)(&route, data.clone());
                if let Some(update_cb) = &task.update_callback {
                    update_cb(data);
                }
            }
            Err(message) => {
                let retries = task.retry_count.fetch_add(1, Ordering::Relaxed) + 1;
                if retries > self.config.max_retries {
                    log::error!("refresh for {route} failed after {retries} retries: {message}");
                    self.tasks.remove(&route);
                    return;
                }

                let backoff_ms = (self.config.initial_delay_ms * 2u64.pow(retries - 1)).min(self.config.max_delay_ms);
                log::warn!("refresh for {route} failed (attempt {retries}), retrying in {backoff_ms}ms: {message}");

                let scheduler = self.clone();
                let retry_route = route.clone();
                let retry_task = task.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    scheduler.spawn_execution(retry_route, retry_task, generation);
                });
                *task.timer_handle.lock() = Some(handle);
            }
        }
    }

    pub fn is_scheduled(&self, route: &str) -> bool {
        self.tasks.contains_key(route)
    }

    pub fn retry_count(&self, route: &str) -> Option<u32> {
        self.tasks.get(route).map(|t| t.retry_count.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as AsyncMutex;

    fn config() -> RefreshConfig {
        RefreshConfig {
            max_retries: 3,
            initial_delay_ms: 5,
            max_delay_ms: 40,
            interaction_defer_delay_ms: 20,
        }
    }

    #[tokio::test]
    async fn successful_refresh_invokes_write_through_and_update_callback() {
        let written = Arc::new(AsyncMutex::new(None));
        let written_clone = written.clone();
        let write_through: WriteThroughHook<String> = Arc::new(move |route, data| {
            let written = written_clone.clone();
            let route = route.to_string();
            tokio::spawn(async move {
                *written.lock().await = Some((route, data));
            });
        });

        let scheduler = RefreshScheduler::<String>::new(config(), write_through);
        let callback: RefreshCallback<String> = Arc::new(|| Box::pin(async { Ok("fresh".to_string()) }));
        scheduler.schedule_refresh("/x", callback, None, None, None);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let guard = written.lock().await;
        assert_eq!(guard.as_ref().unwrap().1, "fresh");
    }

    #[tokio::test]
    async fn failing_callback_retries_with_backoff_then_drops() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let write_through: WriteThroughHook<String> = Arc::new(|_, _| {});
        let scheduler = RefreshScheduler::<String>::new(config(), write_through);

        let callback: RefreshCallback<String> = Arc::new(move || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err("boom".to_string()) })
        });
        scheduler.schedule_refresh("/x", callback, None, None, None);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(!scheduler.is_scheduled("/x"));
    }

    #[tokio::test]
    async fn cancel_refresh_stops_pending_retry() {
        let write_through: WriteThroughHook<String> = Arc::new(|_, _| {});
        let scheduler = RefreshScheduler::<String>::new(config(), write_through);
        let callback: RefreshCallback<String> = Arc::new(|| Box::pin(async { Err("boom".to_string()) }));
        scheduler.schedule_refresh("/x", callback, None, None, None);
        scheduler.cancel_refresh("/x");
        assert!(!scheduler.is_scheduled("/x"));
    }
}
