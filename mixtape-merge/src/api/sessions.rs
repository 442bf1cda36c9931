//! Session queue handlers
//!
//! POST /sessions/:owner_id/items, GET /sessions/:owner_id, DELETE /sessions/:owner_id

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult, MergeError},
    models::{ItemKind, OwnerId, QueueItem},
    AppState,
};

/// POST /sessions/:owner_id/items request
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub kind: ItemKind,
    pub content: String,
    /// Display label; defaults to the last path segment of `content`
    #[serde(default)]
    pub label: Option<String>,
}

/// Queue view returned by every session handler
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub owner_id: OwnerId,
    pub count: usize,
    pub capacity: usize,
    pub items: Vec<QueueItem>,
}

/// DELETE /sessions/:owner_id response
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub owner_id: OwnerId,
    pub discarded: usize,
}

fn status_response(state: &AppState, owner_id: OwnerId) -> SessionStatusResponse {
    let status = state.store.status(owner_id);
    SessionStatusResponse {
        owner_id,
        count: status.count,
        capacity: state.store.capacity(),
        items: status.items,
    }
}

fn default_label(content: &str) -> String {
    content
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(content)
        .to_string()
}

/// POST /sessions/:owner_id/items
///
/// Append one reference. 409 `QUEUE_FULL` once the queue holds its capacity.
pub async fn enqueue_item(
    State(state): State<AppState>,
    Path(owner_id): Path<OwnerId>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<SessionStatusResponse>)> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let label = request
        .label
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| default_label(content));
    let item = QueueItem::new(request.kind, content, label);

    if !state.store.enqueue(owner_id, item) {
        return Err(MergeError::QueueFull {
            capacity: state.store.capacity(),
        }
        .into());
    }

    Ok((StatusCode::CREATED, Json(status_response(&state, owner_id))))
}

/// GET /sessions/:owner_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(owner_id): Path<OwnerId>,
) -> Json<SessionStatusResponse> {
    Json(status_response(&state, owner_id))
}

/// DELETE /sessions/:owner_id
pub async fn clear_session(
    State(state): State<AppState>,
    Path(owner_id): Path<OwnerId>,
) -> Json<ClearResponse> {
    let discarded = state.store.clear(owner_id);
    Json(ClearResponse {
        owner_id,
        discarded,
    })
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/:owner_id", get(get_session).delete(clear_session))
        .route("/sessions/:owner_id/items", post(enqueue_item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_label() {
        assert_eq!(default_label("https://cdn.example.com/a/song.mp3"), "song.mp3");
        assert_eq!(default_label("uploads/dir/"), "dir");
        assert_eq!(default_label("token123"), "token123");
    }
}
