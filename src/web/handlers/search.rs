//! Search query and reindex handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::roles::Permission;
use crate::search::{SearchDoc, SearchError};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, entry_to_json, page_params, storage_error};

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct ReindexRequest {
    actor_id: i64,
}

/// GET /api/search?q= - Query the entry index and load the matching rows
/// in rank order. With indexing disabled the endpoint degrades to an
/// empty, flagged result instead of failing the page.
pub async fn search_entries_handler(
    State(state): State<SharedState>,
    Query(params): Query<SearchQuery>,
) -> Response {
    if params.q.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "query is required");
    }
    let (page, per_page) = page_params(params.page, params.per_page);

    let st = state.lock().await;
    let (ids, total) = match st.search.query(&params.q, page, per_page) {
        Ok(hit) => hit,
        Err(SearchError::Disabled) => {
            tracing::warn!("search request while indexing is disabled");
            let json = serde_json::json!({
                "results": [],
                "total": 0,
                "degraded": true,
            });
            return (StatusCode::OK, axum::Json(json)).into_response();
        }
        Err(e) => return api_error(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    match st.storage.entries_by_ids(&ids) {
        Ok(entries) => {
            let results: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| entry_to_json(e, &st.storage))
                .collect();
            let json = serde_json::json!({
                "results": results,
                "total": total,
                "degraded": false,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// POST /api/search/reindex - Rebuild the entry collection from the
/// store (administrators only). Repairs index drift after out-of-band
/// storage changes.
pub async fn reindex_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<ReindexRequest>,
) -> Response {
    let st = state.lock().await;
    match st.storage.user_can(req.actor_id, Permission::Admin) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::FORBIDDEN, "administrators only"),
        Err(e) => return storage_error(e),
    }

    let entries = match st.storage.all_entries() {
        Ok(entries) => entries,
        Err(e) => return storage_error(e),
    };
    let docs = entries.iter().map(SearchDoc::from_entry);

    match st.search.reindex(docs) {
        Ok(pushed) => {
            tracing::info!(pushed, "reindex complete");
            let json = serde_json::json!({ "status": "ok", "indexed": pushed });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(SearchError::Disabled) => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "search indexing disabled")
        }
        Err(e) => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}
