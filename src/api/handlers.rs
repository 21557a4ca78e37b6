//! API Handlers
//!
//! HTTP request handlers for each admin endpoint. Store operations walk
//! the node tree synchronously, so they run on the blocking pool.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::debug;

use crate::cache::{CacheStore, RequestKey};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::models::{
    DeleteResponse, EntryResponse, HealthResponse, InvalidateRequest, KeyQuery, KeysResponse,
    PassResponse, PutEntryRequest, PutResponse, StatsResponse,
};
use crate::repository::{MemoryRepository, Repository};
use crate::tasks::run_purge;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache store
    pub cache: Arc<CacheStore<RequestKey>>,
}

impl AppState {
    /// Creates a new AppState with the given cache store.
    pub fn new(cache: CacheStore<RequestKey>) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the snapshot file if one is configured and makes sure the
    /// cache root exists.
    pub fn from_config(config: &Config) -> Result<Self> {
        let repository: Arc<dyn Repository> = match &config.snapshot_path {
            Some(path) => Arc::new(MemoryRepository::open(path)?),
            None => Arc::new(MemoryRepository::new()),
        };
        let cache = CacheStore::new(repository, config.store.clone())?;
        cache.ensure_root()?;
        Ok(Self::new(cache))
    }

    /// Runs `op` against the store on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CacheStore<RequestKey>) -> Result<T> + Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || op(&cache))
            .await
            .map_err(|e| StoreError::StoreUnavailable(format!("store task failed: {e}")))?
    }
}

/// Handler for PUT /entries
///
/// Stores a rendered response under the key built from the request.
pub async fn put_handler(
    State(state): State<AppState>,
    Json(req): Json<PutEntryRequest>,
) -> Result<Json<PutResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(StoreError::InvalidRequest(error_msg));
    }

    let (key, content) = req.into_parts();
    let key_string = key.to_string();
    state
        .with_store(move |cache| cache.put(&key, &content))
        .await?;

    Ok(Json(PutResponse::new(key_string)))
}

/// Handler for GET /entries?key=...
///
/// Returns the stored entry whose key renders as `key`.
pub async fn get_handler(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<EntryResponse>> {
    let key_string = query.key.clone();
    let found = state
        .with_store(move |cache| cache.find(&key_string))
        .await?;

    match found {
        Some((key, content)) => Ok(Json(EntryResponse::new(key.to_string(), &content))),
        None => Err(StoreError::NotFound(query.key)),
    }
}

/// Handler for DELETE /entries?key=...
pub async fn delete_handler(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<DeleteResponse>> {
    let key_string = query.key.clone();
    let removed = state
        .with_store(move |cache| cache.invalidate_by_string(&key_string))
        .await?;

    if !removed {
        return Err(StoreError::NotFound(query.key));
    }
    Ok(Json(DeleteResponse::new(query.key)))
}

/// Handler for GET /keys
pub async fn keys_handler(State(state): State<AppState>) -> Result<Json<KeysResponse>> {
    let keys = state.with_store(|cache| cache.keys()).await?;
    Ok(Json(KeysResponse::new(keys)))
}

/// Handler for DELETE /entries/all
///
/// Removes every entry and every bucket below the cache root.
pub async fn invalidate_all_handler(State(state): State<AppState>) -> Result<Json<PassResponse>> {
    let report = state.with_store(|cache| cache.invalidate_all()).await?;
    Ok(Json(report.into()))
}

/// Handler for POST /invalidate
///
/// Removes every entry rendered from the changed resource or below it.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<PassResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(StoreError::InvalidRequest(error_msg));
    }

    debug!("Invalidating entries related to {}", req.resource_path);
    let trigger = RequestKey::for_resource(req.resource_path);
    let report = state
        .with_store(move |cache| cache.invalidate_related(&trigger))
        .await?;
    Ok(Json(report.into()))
}

/// Handler for POST /purge
///
/// Runs one expired-entry purge immediately.
pub async fn purge_handler(State(state): State<AppState>) -> Result<Json<PassResponse>> {
    let report = run_purge(state.cache.clone()).await?;
    Ok(Json(report.into()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.with_store(|cache| cache.stats()).await?;
    Ok(Json(stats.into()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
