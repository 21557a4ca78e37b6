//! Cache Module
//!
//! Persistent HTTP response cache over a hash-bucketed node tree, with
//! lazy TTL expiry on read and batched purge/invalidation passes.

mod bucket;
mod content;
mod entry;
mod key;
mod stats;
mod store;
mod traversal;
pub mod visitors;


// Re-export public types
pub use bucket::{bucket_segments, BucketNodeFactory, BUCKET_TYPE, HASH_WIDTH, SEGMENT_WIDTH};
pub use content::{is_excluded_header, CacheContent, HeaderMap, EXCLUDED_HEADERS};
pub use entry::{entry_name, find_entry, EntryNode, EntryReader, EntryWriter, ENTRY_TYPE};
pub use key::{string_hash, CacheKey, RequestKey};
pub use stats::{CacheStats, StatsCounters};
pub use store::{CacheStore, FOLDER_TYPE};
pub use traversal::{remove_if_empty, BucketVisit, PassReport, Step, Strategy, Traversal};
