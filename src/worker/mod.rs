//! The background execution context: its own persistent store, the
//! install/activate lifecycle, the fetch interceptor, and the message
//! protocol bridging it to foreground UI contexts (§4.H).

pub mod bridge;
pub mod fetch;
pub mod lifecycle;
pub mod messages;

pub use bridge::{decide_navigation, NavigationDecision, WorkerCache, NAVIGATION_STALE_THRESHOLD_MS};
pub use fetch::{classify, FetchRequest, FetchStrategy, WorkerRouting};
pub use lifecycle::{activate, install, LifecycleConfig, LifecycleState, Prefetcher};
pub use messages::{KeyOrTags, WorkerMessage};
