//! Foundational types shared by every cache component: the entry data model
//! and size/clone utilities over JSON-representable payloads.

pub mod entry;
pub mod sized;

pub use entry::{ContentType, Entry, EntryMetadata, PageType, Source};
pub use sized::{approximate_size, deep_clone, deep_clone_json};
