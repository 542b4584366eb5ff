//! Notification polling handler.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::web::state::SharedState;
use crate::web::utils::storage_error;

#[derive(Deserialize)]
pub struct NotificationsQuery {
    user_id: i64,
    /// Strictly-greater cutoff; pass the newest timestamp already seen.
    since: Option<f64>,
}

/// GET /api/notifications?user_id=&since= - Point-in-time snapshot of the
/// user's notifications newer than the cutoff, ascending.
pub async fn poll_notifications_handler(
    State(state): State<SharedState>,
    Query(params): Query<NotificationsQuery>,
) -> Response {
    let st = state.lock().await;
    match st
        .storage
        .notifications_since(params.user_id, params.since.unwrap_or(0.0))
    {
        Ok(notifications) => {
            let json: Vec<serde_json::Value> = notifications
                .iter()
                .map(|n| {
                    serde_json::json!({
                        "name": n.name,
                        "data": n.data(),
                        "timestamp": n.created_at,
                    })
                })
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => storage_error(e),
    }
}
