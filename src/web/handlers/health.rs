//! Health probe.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::web::state::SharedState;

/// GET /api/health - Liveness plus degraded-mode visibility.
pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    let json = serde_json::json!({
        "status": "ok",
        "search_enabled": st.search.is_enabled(),
        "search_dropped_ops": st.search.dropped_ops(),
        "search_failed_ops": st.search.failed_ops(),
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}
