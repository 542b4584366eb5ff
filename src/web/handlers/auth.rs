//! Credential and password-reset handlers, plus the contact form.
//!
//! Session management belongs to the fronting web layer; this surface
//! only verifies credentials and manages reset tokens.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::credentials::{generate_reset_token, hash_password, hash_reset_token, verify_password};
use crate::mailer::OutboundMail;
use crate::web::config::RESET_TOKEN_TTL_SECS;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, now_secs, storage_error, user_to_json};

#[derive(Deserialize)]
pub struct LoginRequest {
    username_or_email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct ResetRequestPayload {
    email: String,
}

#[derive(Deserialize)]
pub struct ResetConfirmPayload {
    token: String,
    password: String,
}

#[derive(Deserialize)]
pub struct ContactPayload {
    name: String,
    email: String,
    message: String,
}

/// POST /api/auth/login - Verify credentials and touch `last_seen`.
pub async fn login_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<LoginRequest>,
) -> Response {
    let st = state.lock().await;
    let lookup = if req.username_or_email.contains('@') {
        st.storage.get_user_by_email(&req.username_or_email)
    } else {
        st.storage.get_user_by_username(&req.username_or_email)
    };
    let user = match lookup {
        Ok(Some(user)) => user,
        Ok(None) => return api_error(StatusCode::UNAUTHORIZED, "invalid credentials"),
        Err(e) => return storage_error(e),
    };
    if !verify_password(&req.password, &user.password_hash) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid credentials");
    }

    if let Err(e) = st.storage.touch_last_seen(user.id) {
        return storage_error(e);
    }
    (StatusCode::OK, axum::Json(user_to_json(&user, &st.storage))).into_response()
}

/// POST /api/auth/password-reset/request - Issue a reset token and mail
/// it. Always answers ok so the endpoint can't be used to probe for
/// registered addresses.
pub async fn request_reset_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<ResetRequestPayload>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_user_by_email(req.email.trim()) {
        Ok(Some(user)) => {
            let (token, token_hash) = generate_reset_token();
            let expires_at = now_secs() + RESET_TOKEN_TTL_SECS;
            if let Err(e) = st.storage.store_reset_token(user.id, &token_hash, expires_at) {
                return storage_error(e);
            }
            st.mailer.send(OutboundMail {
                recipients: vec![user.email.clone()],
                subject: "Password Reset Request".to_string(),
                html_body: format!(
                    "<p>Hi {},</p>\
                     <p>Use this token to reset your password: <code>{token}</code></p>\
                     <p>It expires in {} minutes. If you did not request a reset,\
                     you can ignore this message.</p>",
                    user.username,
                    RESET_TOKEN_TTL_SECS / 60,
                ),
            });
        }
        Ok(None) => {
            tracing::debug!("password reset requested for unknown address");
        }
        Err(e) => return storage_error(e),
    }

    let json = serde_json::json!({ "status": "ok" });
    (StatusCode::OK, axum::Json(json)).into_response()
}

/// POST /api/auth/password-reset/confirm - Redeem a token and set the new
/// password. Tokens are single use and expire.
pub async fn confirm_reset_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<ResetConfirmPayload>,
) -> Response {
    if req.password.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "password is required");
    }

    let st = state.lock().await;
    let user_id = match st.storage.consume_reset_token(&hash_reset_token(&req.token)) {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return api_error(StatusCode::BAD_REQUEST, "invalid or expired token"),
        Err(e) => return storage_error(e),
    };
    match st
        .storage
        .set_password_hash(user_id, &hash_password(&req.password))
    {
        Ok(true) => {
            let json = serde_json::json!({ "status": "ok", "user_id": user_id });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => storage_error(e),
    }
}

/// POST /api/contact - Forward a contact-form submission to the
/// configured recipients. Delivery is fire-and-forget.
pub async fn contact_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<ContactPayload>,
) -> Response {
    if req.message.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "message is required");
    }

    let st = state.lock().await;
    if st.contact_recipients.is_empty() {
        tracing::warn!("contact form submitted but no recipients configured");
        let json = serde_json::json!({ "status": "ok", "delivered": false });
        return (StatusCode::OK, axum::Json(json)).into_response();
    }

    st.mailer.send(OutboundMail {
        recipients: st.contact_recipients.clone(),
        subject: "Contact Request".to_string(),
        html_body: format!(
            "<h3>Name: {}</h3><h3>Email: {}</h3><p>{}</p>",
            req.name, req.email, req.message
        ),
    });
    let json = serde_json::json!({ "status": "ok", "delivered": true });
    (StatusCode::OK, axum::Json(json)).into_response()
}
