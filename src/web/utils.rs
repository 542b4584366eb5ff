//! Shared utility functions for the web layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::{
    CommentRow, EntryRow, LikeTarget, MessageRow, Storage, StorageError, UserRow,
};
use crate::web::config::{DEFAULT_PER_PAGE, MAX_PER_PAGE};

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a storage failure onto the right status code. NotFound and
/// Conflict are normal user-facing outcomes; anything else is a 500.
pub fn storage_error(err: StorageError) -> Response {
    match err {
        StorageError::NotFound(msg) => api_error(StatusCode::NOT_FOUND, msg),
        StorageError::Conflict(msg) => api_error(StatusCode::CONFLICT, msg),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// Clamp pagination query parameters to sane bounds.
pub fn page_params(page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page)
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Public profile JSON, with follower/following counts attached.
pub fn user_to_json(user: &UserRow, storage: &Storage) -> serde_json::Value {
    let (followers, following) = storage.follow_counts(user.id).unwrap_or((0, 0));
    serde_json::json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "about_me": user.about_me,
        "web_url": user.web_url,
        "avatar_file": user.avatar_file,
        "member_since": user.member_since,
        "last_seen": user.last_seen,
        "followers": followers,
        "following": following,
    })
}

/// Entry JSON with its like and visible-comment counts.
pub fn entry_to_json(entry: &EntryRow, storage: &Storage) -> serde_json::Value {
    let likes = storage
        .count_likes(LikeTarget::from(entry.kind), entry.id)
        .unwrap_or(0);
    let comments = storage.count_comments(entry.id).unwrap_or(0);
    serde_json::json!({
        "id": entry.id,
        "kind": entry.kind,
        "author_id": entry.author_id,
        "city": entry.city,
        "category": entry.category,
        "title": entry.title,
        "body": entry.body,
        "summary": entry.summary,
        "created_at": entry.created_at,
        "likes": likes,
        "comments": comments,
    })
}

pub fn comment_to_json(comment: &CommentRow, storage: &Storage) -> serde_json::Value {
    let likes = storage
        .count_likes(LikeTarget::Comment, comment.id)
        .unwrap_or(0);
    serde_json::json!({
        "id": comment.id,
        "entry_id": comment.entry_id,
        "author_id": comment.author_id,
        "body": comment.body,
        "disabled": comment.disabled,
        "created_at": comment.created_at,
        "likes": likes,
    })
}

pub fn message_to_json(message: &MessageRow) -> serde_json::Value {
    serde_json::json!({
        "id": message.id,
        "sender_id": message.sender_id,
        "recipient_id": message.recipient_id,
        "body": message.body,
        "created_at": message.created_at,
    })
}
