//! HTTP Tree Cache - a persistent HTTP response cache over a node tree
//!
//! Responses are stored as entry nodes under hash-derived bucket paths.
//! Expired entries are hidden on read and removed by batched purge passes.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheContent, CacheKey, CacheStore, RequestKey};
pub use config::{Config, StoreConfig};
pub use error::StoreError;
pub use repository::{MemoryRepository, Repository};
pub use tasks::spawn_purge_task;
