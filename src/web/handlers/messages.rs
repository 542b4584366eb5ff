//! Private message handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::storage::MessageBox;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, message_to_json, page_params, storage_error};

#[derive(Deserialize)]
pub struct SendMessageRequest {
    actor_id: i64,
    recipient_id: i64,
    body: String,
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    user_id: i64,
    #[serde(rename = "box")]
    mbox: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct UserQuery {
    user_id: i64,
}

/// POST /api/messages - Send a private message. The recipient's unread
/// counter notification refreshes in the same storage transaction.
pub async fn send_message_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<SendMessageRequest>,
) -> Response {
    if req.body.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "message body is required");
    }

    let st = state.lock().await;
    for (id, label) in [(req.actor_id, "sender"), (req.recipient_id, "recipient")] {
        match st.storage.get_user(id) {
            Ok(Some(_)) => {}
            Ok(None) => return api_error(StatusCode::NOT_FOUND, format!("{label} not found")),
            Err(e) => return storage_error(e),
        }
    }

    match st
        .storage
        .send_message(req.actor_id, req.recipient_id, &req.body)
    {
        Ok((message, unread)) => {
            let mut json = message_to_json(&message);
            json["recipient_unread"] = serde_json::json!(unread);
            (StatusCode::CREATED, axum::Json(json)).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/messages?user_id=&box=received|sent - Oldest first. Listing
/// does not mark anything read; POST /api/messages/read does that.
pub async fn list_messages_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListMessagesQuery>,
) -> Response {
    let mbox = match params.mbox.as_deref() {
        None | Some("received") => MessageBox::Received,
        Some("sent") => MessageBox::Sent,
        Some(other) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("box must be 'received' or 'sent', got '{other}'"),
            )
        }
    };
    let (page, per_page) = page_params(params.page, params.per_page);

    let st = state.lock().await;
    match st.storage.list_messages(params.user_id, mbox, page, per_page) {
        Ok(messages) => {
            let json: Vec<serde_json::Value> = messages.iter().map(message_to_json).collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// POST /api/messages/read - Mark the feed read and zero the counter,
/// atomically.
pub async fn mark_read_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<UserQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.mark_messages_read(req.user_id) {
        Ok(()) => {
            let json = serde_json::json!({
                "status": "ok",
                "user_id": req.user_id,
                "unread": 0,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/messages/unread-count?user_id=
pub async fn unread_count_handler(
    State(state): State<SharedState>,
    Query(params): Query<UserQuery>,
) -> Response {
    let st = state.lock().await;
    match st.storage.unread_count(params.user_id) {
        Ok(count) => {
            let json = serde_json::json!({
                "user_id": params.user_id,
                "unread": count,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => storage_error(e),
    }
}
