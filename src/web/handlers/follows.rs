//! Follow graph handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::roles::Permission;
use crate::web::config::FOLLOWERS_PER_PAGE;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, storage_error};

#[derive(Deserialize)]
pub struct FollowRequest {
    actor_id: i64,
}

#[derive(Deserialize)]
pub struct FollowListQuery {
    page: Option<u32>,
}

/// POST /api/users/:id/follow - Actor starts following the user.
pub async fn follow_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<FollowRequest>,
) -> Response {
    if req.actor_id == id {
        return api_error(StatusCode::BAD_REQUEST, "cannot follow yourself");
    }

    let st = state.lock().await;
    match st.storage.user_can(req.actor_id, Permission::Follow) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::FORBIDDEN, "actor may not follow"),
        Err(e) => return storage_error(e),
    }
    match st.storage.get_user(id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return storage_error(e),
    }

    // Duplicate follows fall through to "already following".
    match st.storage.follow(req.actor_id, id) {
        Ok(newly) => {
            let json = serde_json::json!({
                "status": if newly { "following" } else { "already_following" },
                "actor_id": req.actor_id,
                "user_id": id,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// POST /api/users/:id/unfollow - Actor stops following the user.
pub async fn unfollow_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<FollowRequest>,
) -> Response {
    if req.actor_id == id {
        return api_error(StatusCode::BAD_REQUEST, "cannot unfollow yourself");
    }

    let st = state.lock().await;
    match st.storage.get_user(id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return storage_error(e),
    }

    match st.storage.unfollow(req.actor_id, id) {
        Ok(removed) => {
            let json = serde_json::json!({
                "status": if removed { "unfollowed" } else { "not_following" },
                "actor_id": req.actor_id,
                "user_id": id,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/users/:id/followers - Who follows this user, oldest edge first.
pub async fn list_followers_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(params): Query<FollowListQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_user(id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return storage_error(e),
    }
    match st
        .storage
        .list_followers(id, params.page.unwrap_or(1), FOLLOWERS_PER_PAGE)
    {
        Ok(items) => (StatusCode::OK, axum::Json(serde_json::json!(items))).into_response(),
        Err(e) => storage_error(e),
    }
}

/// GET /api/users/:id/following - Who this user follows, oldest edge first.
pub async fn list_following_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(params): Query<FollowListQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_user(id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return storage_error(e),
    }
    match st
        .storage
        .list_following(id, params.page.unwrap_or(1), FOLLOWERS_PER_PAGE)
    {
        Ok(items) => (StatusCode::OK, axum::Json(serde_json::json!(items))).into_response(),
        Err(e) => storage_error(e),
    }
}

/// GET /api/users/:id/follows/:other - Relationship between two users.
/// Unknown ids read as "no relationship" rather than an error.
pub async fn follow_status_handler(
    State(state): State<SharedState>,
    Path((id, other)): Path<(i64, i64)>,
) -> Response {
    let st = state.lock().await;
    let is_following = st.storage.is_following(id, other).unwrap_or(false);
    let is_followed_by = st.storage.is_followed_by(id, other).unwrap_or(false);
    let json = serde_json::json!({
        "user_id": id,
        "other_id": other,
        "is_following": is_following,
        "is_followed_by": is_followed_by,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}
