//! Comment handlers, including the moderation switch.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::roles::Permission;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, comment_to_json, page_params, storage_error};

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    actor_id: i64,
    body: String,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    actor_id: i64,
}

#[derive(Deserialize)]
pub struct ListCommentsQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    /// Moderator view: include disabled comments.
    include_disabled: Option<bool>,
}

/// POST /api/entries/:id/comments - Comment on an entry.
pub async fn create_comment_handler(
    State(state): State<SharedState>,
    Path(entry_id): Path<i64>,
    axum::Json(req): axum::Json<CreateCommentRequest>,
) -> Response {
    if req.body.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "comment body is required");
    }

    let st = state.lock().await;
    match st.storage.user_can(req.actor_id, Permission::Comment) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::FORBIDDEN, "actor may not comment"),
        Err(e) => return storage_error(e),
    }
    match st.storage.get_entry(entry_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => return storage_error(e),
    }

    match st.storage.insert_comment(entry_id, req.actor_id, &req.body) {
        Ok(comment) => (
            StatusCode::CREATED,
            axum::Json(comment_to_json(&comment, &st.storage)),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

/// GET /api/entries/:id/comments - Oldest first.
pub async fn list_comments_handler(
    State(state): State<SharedState>,
    Path(entry_id): Path<i64>,
    Query(params): Query<ListCommentsQuery>,
) -> Response {
    let (page, per_page) = page_params(params.page, params.per_page);
    let st = state.lock().await;
    match st.storage.get_entry(entry_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.list_comments(
        entry_id,
        params.include_disabled.unwrap_or(false),
        page,
        per_page,
    ) {
        Ok(comments) => {
            let json: Vec<serde_json::Value> = comments
                .iter()
                .map(|c| comment_to_json(c, &st.storage))
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// POST /api/comments/:id/disable - Hide a comment (moderators only).
pub async fn disable_comment_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<ActorRequest>,
) -> Response {
    set_disabled(state, id, req.actor_id, true).await
}

/// POST /api/comments/:id/enable - Restore a hidden comment.
pub async fn enable_comment_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<ActorRequest>,
) -> Response {
    set_disabled(state, id, req.actor_id, false).await
}

async fn set_disabled(state: SharedState, id: i64, actor_id: i64, disabled: bool) -> Response {
    let st = state.lock().await;
    match st.storage.user_can(actor_id, Permission::Moderate) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::FORBIDDEN, "actor may not moderate"),
        Err(e) => return storage_error(e),
    }
    match st.storage.set_comment_disabled(id, disabled) {
        Ok(true) => {
            let json = serde_json::json!({
                "status": "ok",
                "id": id,
                "disabled": disabled,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => storage_error(e),
    }
}

/// DELETE /api/comments/:id - Remove a comment (author or moderator).
pub async fn delete_comment_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<ActorRequest>,
) -> Response {
    let st = state.lock().await;
    let comment = match st.storage.get_comment(id) {
        Ok(Some(comment)) => comment,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => return storage_error(e),
    };
    if comment.author_id != req.actor_id {
        match st.storage.user_can(req.actor_id, Permission::Moderate) {
            Ok(true) => {}
            Ok(false) => {
                return api_error(
                    StatusCode::FORBIDDEN,
                    "only the author or a moderator may delete a comment",
                )
            }
            Err(e) => return storage_error(e),
        }
    }

    match st.storage.delete_comment(id) {
        Ok(true) => {
            let json = serde_json::json!({ "status": "deleted", "id": id });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "comment not found"),
        Err(e) => storage_error(e),
    }
}
