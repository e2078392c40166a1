//! Typed message envelopes exchanged between the worker and attached UI
//! contexts (§4.H, §6).
//!
//! Modeled as a serde internally-tagged enum rather than the teacher's
//! `#[repr(u8)]` binary opcode style in
//! `enterprise::collaboration::protocol::MessageType`, since §6 specifies a
//! JSON-like `{ type, ... }` envelope, and an internally-tagged enum is the
//! idiomatic Rust match for that contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::entry::{Entry, Source};

/// `keyOrTags` from §4.H's `CACHE_INVALIDATE`: either a single key or a set
/// of tags to match against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyOrTags {
    Key(String),
    Tags(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "CACHE_SET")]
    CacheSet { key: String, cache_entry: Entry<Value> },

    #[serde(rename = "CACHE_GET")]
    CacheGet { key: String, request_id: String },

    #[serde(rename = "CACHE_GET_RESPONSE")]
    CacheGetResponse {
        key: String,
        cache_entry: Option<Entry<Value>>,
        request_id: String,
        timestamp: i64,
    },

    #[serde(rename = "CACHE_INVALIDATE")]
    CacheInvalidate { key_or_tags: KeyOrTags },

    #[serde(rename = "CACHE_WARM")]
    CacheWarm { routes: Option<Vec<String>> },

    #[serde(rename = "CACHE_WARM_COMPLETE")]
    CacheWarmComplete {
        routes: Vec<String>,
        success_count: Option<usize>,
        failure_count: Option<usize>,
        timestamp: i64,
    },

    #[serde(rename = "CACHE_WARM_FAILED")]
    CacheWarmFailed { error: String, timestamp: i64 },

    #[serde(rename = "CACHE_UPDATED")]
    CacheUpdated { key: String, source: Source, timestamp: i64 },
}
