//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;
use tokio::sync::RwLock;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::cache::{CacheEngine, GetOptions, StorageStats};
use crate::config::{CacheConfig, CacheFlags};
use crate::error::{CacheError, Result};
use crate::models::{
    CleanupResponse, ClearResponse, DeleteResponse, ErrorResponse, GetQuery, GetResponse,
    HealthResponse, KeysResponse, MetricsResponse, SetRequest, SetResponse,
};

/// Application state shared across all handlers.
///
/// The engine is synchronous; handlers take the write lock for anything that
/// may touch the mirror, the metrics or the notifier.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<RwLock<CacheEngine>>,
}

impl AppState {
    /// Wraps an existing engine.
    pub fn new(cache: CacheEngine) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    /// Builds the engine from configuration and derives its encryption key,
    /// so no request handler runs PBKDF2 while holding the write lock.
    ///
    /// Fails only in strict mode when the backend is unusable.
    pub fn from_config(config: CacheConfig, flags: CacheFlags) -> Result<Self> {
        let engine = CacheEngine::new(config, flags)?;
        engine.prepare_encryption_key();
        Ok(Self::new(engine))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value with optional TTL and encryption.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidKey(error_msg));
    }

    let options = req.put_options();
    let mut cache = state.cache.write().await;
    if !cache.put_value(&req.key, req.value, options)? {
        return Err(CacheError::Unavailable(format!(
            "write of '{}' was not persisted",
            req.key
        )));
    }

    Ok(Json(SetResponse::new(req.key, options.encrypt)))
}

/// Handler for GET /get/:key
///
/// Missing, expired and undecodable keys all answer 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<GetQuery>,
) -> Response {
    let options = GetOptions {
        decrypt: query.decrypt,
        default_value: None,
    };

    let mut cache = state.cache.write().await;
    match cache.get(&key, options) {
        Some(value) => Json(GetResponse::new(key, value)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Key not found: {}", key))),
        )
            .into_response(),
    }
}

/// Handler for DELETE /del/:key
///
/// Idempotent: deleting an absent key still answers 200.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<DeleteResponse> {
    let mut cache = state.cache.write().await;
    let existed = cache.has(&key);
    cache.remove(&key);

    Json(DeleteResponse::new(key, existed))
}

/// Handler for DELETE /clear
///
/// Removes every key in the engine's namespace.
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let mut cache = state.cache.write().await;
    let cleared = cache.clear();

    Json(ClearResponse {
        cleared,
        prefix: cache.config().prefix.clone(),
    })
}

/// Handler for GET /keys
pub async fn keys_handler(State(state): State<AppState>) -> Json<KeysResponse> {
    let cache = state.cache.read().await;
    Json(KeysResponse::new(cache.keys()))
}

/// Handler for GET /stats
///
/// Storage usage of the namespace.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StorageStats> {
    let cache = state.cache.read().await;
    Json(cache.stats())
}

/// Handler for GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    let cache = state.cache.read().await;
    Json(MetricsResponse::from_metrics(cache.metrics()))
}

/// Handler for POST /cleanup
///
/// Runs a sweep immediately instead of waiting for the background task.
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupResponse> {
    let mut cache = state.cache.write().await;
    Json(CleanupResponse {
        removed: cache.cleanup(),
    })
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.cache.read().await;
    Json(HealthResponse::new(
        cache.is_storage_supported(),
        cache.is_encryption_supported(),
    ))
}
