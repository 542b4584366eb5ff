//! Content entry handlers. Create, update, and delete feed the search
//! synchronizer after the storage write commits.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::roles::Permission;
use crate::search::{ChangeSet, SearchDoc};
use crate::storage::{EntryKind, EntryUpdate, NewEntry};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, entry_to_json, page_params, storage_error};

#[derive(Deserialize)]
pub struct CreateEntryRequest {
    actor_id: i64,
    kind: EntryKind,
    city: String,
    category: String,
    title: String,
    body: String,
    summary: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateEntryRequest {
    actor_id: i64,
    #[serde(flatten)]
    update: EntryUpdate,
}

#[derive(Deserialize)]
pub struct DeleteEntryRequest {
    actor_id: i64,
}

#[derive(Deserialize)]
pub struct ListEntriesQuery {
    kind: Option<EntryKind>,
    author_id: Option<i64>,
    page: Option<u32>,
    per_page: Option<u32>,
}

/// POST /api/entries - Author a new entry.
pub async fn create_entry_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateEntryRequest>,
) -> Response {
    if req.title.trim().is_empty() || req.body.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "title and body are required");
    }

    let st = state.lock().await;
    match st.storage.user_can(req.actor_id, Permission::Write) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::FORBIDDEN, "actor may not write entries"),
        Err(e) => return storage_error(e),
    }

    let new = NewEntry {
        kind: req.kind,
        author_id: req.actor_id,
        city: req.city.clone(),
        category: req.category.clone(),
        title: req.title.clone(),
        body: req.body.clone(),
        summary: req.summary.clone(),
    };
    let entry = match st.storage.insert_entry(&new) {
        Ok(entry) => entry,
        Err(e) => return storage_error(e),
    };

    // Storage write is durable; mirror it into the index.
    let mut changes = ChangeSet::default();
    changes.stage_upsert(SearchDoc::from_entry(&entry));
    st.search.apply(changes);

    (
        StatusCode::CREATED,
        axum::Json(entry_to_json(&entry, &st.storage)),
    )
        .into_response()
}

/// GET /api/entries/:id
pub async fn get_entry_handler(State(state): State<SharedState>, Path(id): Path<i64>) -> Response {
    let st = state.lock().await;
    match st.storage.get_entry(id) {
        Ok(Some(entry)) => {
            (StatusCode::OK, axum::Json(entry_to_json(&entry, &st.storage))).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => storage_error(e),
    }
}

/// PUT /api/entries/:id - Edit an entry (author only).
pub async fn update_entry_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<UpdateEntryRequest>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_entry(id) {
        Ok(Some(entry)) if entry.author_id != req.actor_id => {
            return api_error(StatusCode::FORBIDDEN, "only the author may edit an entry");
        }
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => return storage_error(e),
    }

    match st.storage.update_entry(id, &req.update) {
        Ok(Some(entry)) => {
            let mut changes = ChangeSet::default();
            changes.stage_upsert(SearchDoc::from_entry(&entry));
            st.search.apply(changes);
            (StatusCode::OK, axum::Json(entry_to_json(&entry, &st.storage))).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => storage_error(e),
    }
}

/// DELETE /api/entries/:id - Remove an entry (author or moderator).
pub async fn delete_entry_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<DeleteEntryRequest>,
) -> Response {
    let st = state.lock().await;
    let entry = match st.storage.get_entry(id) {
        Ok(Some(entry)) => entry,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => return storage_error(e),
    };
    if entry.author_id != req.actor_id {
        match st.storage.user_can(req.actor_id, Permission::Moderate) {
            Ok(true) => {}
            Ok(false) => {
                return api_error(
                    StatusCode::FORBIDDEN,
                    "only the author or a moderator may delete an entry",
                )
            }
            Err(e) => return storage_error(e),
        }
    }

    match st.storage.delete_entry(id) {
        Ok(true) => {
            let mut changes = ChangeSet::default();
            changes.stage_removal(id);
            st.search.apply(changes);
            let json = serde_json::json!({ "status": "deleted", "id": id });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "entry not found"),
        Err(e) => storage_error(e),
    }
}

/// GET /api/entries - Newest first, optionally filtered by kind or author.
pub async fn list_entries_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListEntriesQuery>,
) -> Response {
    let (page, per_page) = page_params(params.page, params.per_page);
    let st = state.lock().await;
    match st
        .storage
        .list_entries(params.kind, params.author_id, page, per_page)
    {
        Ok(entries) => {
            let json: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| entry_to_json(e, &st.storage))
                .collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(e) => storage_error(e),
    }
}
