//! Like/unlike handlers for entries and comments.
//!
//! The target kind is derived from the addressed row, so callers never
//! name it and cannot mismatch kind and id.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::storage::LikeTarget;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, storage_error};

#[derive(Deserialize)]
pub struct LikeRequest {
    actor_id: i64,
}

#[derive(Deserialize)]
pub struct LikeStatusQuery {
    user_id: Option<i64>,
}

fn like_response(
    st: &crate::web::state::AppState,
    target: LikeTarget,
    target_id: i64,
    status: &str,
) -> Response {
    let count = st.storage.count_likes(target, target_id).unwrap_or(0);
    let json = serde_json::json!({
        "status": status,
        "target_kind": target.as_str(),
        "target_id": target_id,
        "likes": count,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}

/// POST /api/entries/:id/like - Idempotent: liking twice changes nothing.
pub async fn like_entry_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<LikeRequest>,
) -> Response {
    let st = state.lock().await;
    let entry = match st.storage.get_entry(id) {
        Ok(Some(entry)) => entry,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => return storage_error(e),
    };
    let target = LikeTarget::from(entry.kind);
    match st.storage.like(req.actor_id, target, id) {
        Ok(_) => like_response(&st, target, id, "liked"),
        Err(e) => storage_error(e),
    }
}

/// POST /api/entries/:id/unlike - Idempotent inverse of like.
pub async fn unlike_entry_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<LikeRequest>,
) -> Response {
    let st = state.lock().await;
    let entry = match st.storage.get_entry(id) {
        Ok(Some(entry)) => entry,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => return storage_error(e),
    };
    let target = LikeTarget::from(entry.kind);
    match st.storage.unlike(req.actor_id, target, id) {
        Ok(_) => like_response(&st, target, id, "unliked"),
        Err(e) => storage_error(e),
    }
}

/// GET /api/entries/:id/likes - Count, plus `liked` for an optional user.
pub async fn entry_likes_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(params): Query<LikeStatusQuery>,
) -> Response {
    let st = state.lock().await;
    let entry = match st.storage.get_entry(id) {
        Ok(Some(entry)) => entry,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => return storage_error(e),
    };
    let target = LikeTarget::from(entry.kind);
    likes_status(&st, target, id, params.user_id)
}

/// POST /api/comments/:id/like
pub async fn like_comment_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<LikeRequest>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_comment(id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.like(req.actor_id, LikeTarget::Comment, id) {
        Ok(_) => like_response(&st, LikeTarget::Comment, id, "liked"),
        Err(e) => storage_error(e),
    }
}

/// POST /api/comments/:id/unlike
pub async fn unlike_comment_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<LikeRequest>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_comment(id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.unlike(req.actor_id, LikeTarget::Comment, id) {
        Ok(_) => like_response(&st, LikeTarget::Comment, id, "unliked"),
        Err(e) => storage_error(e),
    }
}

/// GET /api/comments/:id/likes
pub async fn comment_likes_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(params): Query<LikeStatusQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_comment(id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => return storage_error(e),
    }
    likes_status(&st, LikeTarget::Comment, id, params.user_id)
}

fn likes_status(
    st: &crate::web::state::AppState,
    target: LikeTarget,
    target_id: i64,
    user_id: Option<i64>,
) -> Response {
    let count = match st.storage.count_likes(target, target_id) {
        Ok(count) => count,
        Err(e) => return storage_error(e),
    };
    let liked = user_id
        .map(|u| st.storage.has_liked(u, target, target_id).unwrap_or(false));
    let json = serde_json::json!({
        "target_kind": target.as_str(),
        "target_id": target_id,
        "likes": count,
        "liked": liked,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}
