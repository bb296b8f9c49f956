use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, http::StatusCode};
use std::sync::Arc;

use super::service::StorageNodeService;
use super::store::StoreError;
use crate::storage::protocol::*;

/// Upper bound on a request body. Object bytes travel base64-encoded, so the
/// largest object a node accepts is about three quarters of this (~190 MiB);
/// larger stores are answered with 413 and count as failed replicas.
const MAX_REQUEST_BYTES: usize = 256 * 1024 * 1024;

pub fn router(service: Arc<StorageNodeService>) -> Router {
    Router::new()
        .route(ENDPOINT_STORE, post(handle_store))
        .route(ENDPOINT_RETRIEVE, post(handle_retrieve))
        .route(ENDPOINT_DELETE, post(handle_delete))
        .route(ENDPOINT_GOSSIP, post(handle_gossip))
        .route(ENDPOINT_CLUSTER_STATUS, get(handle_cluster_status))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(Extension(service))
}

fn status_for(e: &StoreError) -> StatusCode {
    match e {
        StoreError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Io(_) | StoreError::Meta(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_store(
    Extension(service): Extension<Arc<StorageNodeService>>,
    Json(req): Json<StoreRequest>,
) -> (StatusCode, Json<StoreResponse>) {
    match service.store(&req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)),
        Err(e) => {
            tracing::error!("Failed to store {}/{}: {}", req.bucket, req.key, e);
            (status_for(&e), Json(StoreResponse { success: false }))
        }
    }
}

pub async fn handle_retrieve(
    Extension(service): Extension<Arc<StorageNodeService>>,
    Json(req): Json<RetrieveRequest>,
) -> (StatusCode, Json<RetrieveResponse>) {
    match service.retrieve(&req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)),
        Err(e) => {
            tracing::error!("Failed to retrieve {}/{}: {}", req.bucket, req.key, e);
            (status_for(&e), Json(RetrieveResponse::not_found()))
        }
    }
}

pub async fn handle_delete(
    Extension(service): Extension<Arc<StorageNodeService>>,
    Json(req): Json<DeleteRequest>,
) -> (StatusCode, Json<DeleteResponse>) {
    match service.delete(&req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)),
        Err(e) => {
            tracing::error!("Failed to delete {}/{}: {}", req.bucket, req.key, e);
            (status_for(&e), Json(DeleteResponse { success: false }))
        }
    }
}

pub async fn handle_gossip(
    Extension(service): Extension<Arc<StorageNodeService>>,
    Json(msg): Json<GossipMessage>,
) -> (StatusCode, Json<GossipResponse>) {
    (StatusCode::OK, Json(service.gossip(msg)))
}

pub async fn handle_cluster_status(
    Extension(service): Extension<Arc<StorageNodeService>>,
) -> (StatusCode, Json<ClusterStatusResponse>) {
    (StatusCode::OK, Json(service.cluster_status()))
}
