//! User registration and profile handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::credentials::hash_password;
use crate::storage::{NewUser, ProfileUpdate};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, storage_error, user_to_json};

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    actor_id: i64,
    #[serde(flatten)]
    update: ProfileUpdate,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
    first_name: Option<String>,
    last_name: Option<String>,
}

/// POST /api/users - Register an account.
pub async fn register_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<RegisterRequest>,
) -> Response {
    let username = req.username.trim();
    let email = req.email.trim();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "username, email, and password are required",
        );
    }

    let new = NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(&req.password),
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
    };

    let st = state.lock().await;
    match st.storage.create_user(&new, st.admin_email.as_deref()) {
        Ok(user) => {
            tracing::info!(user = user.id, username = %user.username, "registered user");
            (StatusCode::CREATED, axum::Json(user_to_json(&user, &st.storage))).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/users/:id - Profile with follower/following counts.
pub async fn get_user_handler(State(state): State<SharedState>, Path(id): Path<i64>) -> Response {
    let st = state.lock().await;
    match st.storage.get_user(id) {
        Ok(Some(user)) => {
            (StatusCode::OK, axum::Json(user_to_json(&user, &st.storage))).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => storage_error(e),
    }
}

/// PUT /api/users/:id - Update account fields; only the account owner.
pub async fn update_user_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<UpdateUserRequest>,
) -> Response {
    if req.actor_id != id {
        return api_error(StatusCode::FORBIDDEN, "only the account owner may edit it");
    }
    let st = state.lock().await;
    match st.storage.update_profile(id, &req.update) {
        Ok(true) => match st.storage.get_user(id) {
            Ok(Some(user)) => {
                (StatusCode::OK, axum::Json(user_to_json(&user, &st.storage))).into_response()
            }
            Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => storage_error(e),
        },
        Ok(false) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => storage_error(e),
    }
}
