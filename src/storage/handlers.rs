use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{GetResponse, PutRequest, PutResponse};
use crate::node::GridNode;

pub async fn handle_put(
    Extension(node): Extension<Arc<GridNode>>,
    Path(cache_name): Path<String>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<PutResponse>) {
    let cache = node.caches.get_or_create_cache(&cache_name);

    match cache.put_raw(req.key, req.value).await {
        Ok(()) => (StatusCode::OK, Json(PutResponse { success: true })),
        Err(e) => {
            tracing::error!("Failed to put into {}: {}", cache_name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PutResponse { success: false }),
            )
        }
    }
}

pub async fn handle_get(
    Extension(node): Extension<Arc<GridNode>>,
    Path((cache_name, key)): Path<(String, String)>,
) -> (StatusCode, Json<GetResponse>) {
    let Some(cache) = node.caches.get_cache(&cache_name) else {
        return (StatusCode::NOT_FOUND, Json(GetResponse { value: None }));
    };

    match cache.get_raw(&key).await {
        Ok(Some(value)) => (StatusCode::OK, Json(GetResponse { value: Some(value) })),
        Ok(None) => (StatusCode::NOT_FOUND, Json(GetResponse { value: None })),
        Err(e) => {
            tracing::error!("Failed to get {} from {}: {}", key, cache_name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GetResponse { value: None }),
            )
        }
    }
}
