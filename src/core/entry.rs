//! The cache entry data model shared by [`crate::cache::memory`] and
//! [`crate::cache::persistent`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Closed set of route classifications used for priority scoring and tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageType {
    Dashboard,
    Profile,
    Timetable,
    Settings,
    PublicProfile,
    Other,
}

impl PageType {
    /// Base score contribution used by [`crate::cache::priority`].
    pub fn base_score(self) -> f64 {
        match self {
            PageType::Dashboard => 100.0,
            PageType::Profile => 90.0,
            PageType::Timetable => 70.0,
            PageType::Settings => 60.0,
            PageType::PublicProfile => 50.0,
            PageType::Other => 30.0,
        }
    }

    /// Tag form, e.g. `page:dashboard`.
    pub fn as_tag(self) -> String {
        format!("page:{}", self.as_str())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageType::Dashboard => "dashboard",
            PageType::Profile => "profile",
            PageType::Timetable => "timetable",
            PageType::Settings => "settings",
            PageType::PublicProfile => "public-profile",
            PageType::Other => "other",
        }
    }
}

/// Closed set of content classifications used for priority scoring and tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    UserGenerated,
    Personalized,
    Generic,
}

impl ContentType {
    pub fn base_score(self) -> f64 {
        match self {
            ContentType::UserGenerated => 100.0,
            ContentType::Personalized => 70.0,
            ContentType::Generic => 30.0,
        }
    }

    pub fn as_tag(self) -> String {
        format!("content:{}", self.as_str())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::UserGenerated => "user-generated",
            ContentType::Personalized => "personalized",
            ContentType::Generic => "generic",
        }
    }
}

/// Provenance of a cache entry's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Network,
    Cache,
    Prefetch,
}

/// Bookkeeping fields distinct from the cached payload itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub access_count: u64,
    pub source: Source,
    pub page_type: PageType,
    pub content_type: ContentType,
    pub route: String,
    pub has_unsaved_changes: bool,
}

impl EntryMetadata {
    pub fn new(route: impl Into<String>, page_type: PageType, content_type: ContentType, now_ms: i64) -> Self {
        EntryMetadata {
            created_at: now_ms,
            last_accessed_at: now_ms,
            access_count: 0,
            source: Source::Network,
            page_type,
            content_type,
            route: route.into(),
            has_unsaved_changes: false,
        }
    }
}

/// A single cache record for one key, generic over the cached payload type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry<T> {
    pub data: T,
    pub timestamp: i64,
    pub expires_at: i64,
    pub priority: f64,
    pub size_bytes: usize,
    pub tags: BTreeSet<String>,
    pub stale: bool,
    pub metadata: EntryMetadata,
}

impl<T> Entry<T> {
    /// `expiresAt < now`, per §3. Offline mode is handled by the caller.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at < now_ms
    }

    /// Standard tag set derived from metadata: `route:<r>`, `page:<pt>`, `content:<ct>`.
    pub fn derived_tags(route: &str, page_type: PageType, content_type: ContentType) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        tags.insert(format!("route:{route}"));
        tags.insert(page_type.as_tag());
        tags.insert(content_type.as_tag());
        tags
    }

    /// Pinned entries are never removed by routine cleanup (§3 invariant).
    pub fn is_pinned(&self) -> bool {
        self.priority > 80.0 || self.metadata.has_unsaved_changes
    }
}
