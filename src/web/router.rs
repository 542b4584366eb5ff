//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Users API
        .route("/api/users", post(handlers::users::register_handler))
        .route(
            "/api/users/:id",
            get(handlers::users::get_user_handler).put(handlers::users::update_user_handler),
        )
        // Follow graph API
        .route(
            "/api/users/:id/follow",
            post(handlers::follows::follow_handler),
        )
        .route(
            "/api/users/:id/unfollow",
            post(handlers::follows::unfollow_handler),
        )
        .route(
            "/api/users/:id/followers",
            get(handlers::follows::list_followers_handler),
        )
        .route(
            "/api/users/:id/following",
            get(handlers::follows::list_following_handler),
        )
        .route(
            "/api/users/:id/follows/:other",
            get(handlers::follows::follow_status_handler),
        )
        // Entries API
        .route(
            "/api/entries",
            get(handlers::entries::list_entries_handler)
                .post(handlers::entries::create_entry_handler),
        )
        .route(
            "/api/entries/:id",
            get(handlers::entries::get_entry_handler)
                .put(handlers::entries::update_entry_handler)
                .delete(handlers::entries::delete_entry_handler),
        )
        // Comments API
        .route(
            "/api/entries/:id/comments",
            get(handlers::comments::list_comments_handler)
                .post(handlers::comments::create_comment_handler),
        )
        .route(
            "/api/comments/:id",
            axum::routing::delete(handlers::comments::delete_comment_handler),
        )
        .route(
            "/api/comments/:id/disable",
            post(handlers::comments::disable_comment_handler),
        )
        .route(
            "/api/comments/:id/enable",
            post(handlers::comments::enable_comment_handler),
        )
        // Likes API
        .route(
            "/api/entries/:id/like",
            post(handlers::likes::like_entry_handler),
        )
        .route(
            "/api/entries/:id/unlike",
            post(handlers::likes::unlike_entry_handler),
        )
        .route(
            "/api/entries/:id/likes",
            get(handlers::likes::entry_likes_handler),
        )
        .route(
            "/api/comments/:id/like",
            post(handlers::likes::like_comment_handler),
        )
        .route(
            "/api/comments/:id/unlike",
            post(handlers::likes::unlike_comment_handler),
        )
        .route(
            "/api/comments/:id/likes",
            get(handlers::likes::comment_likes_handler),
        )
        // Messages API
        .route(
            "/api/messages",
            get(handlers::messages::list_messages_handler)
                .post(handlers::messages::send_message_handler),
        )
        .route(
            "/api/messages/read",
            post(handlers::messages::mark_read_handler),
        )
        .route(
            "/api/messages/unread-count",
            get(handlers::messages::unread_count_handler),
        )
        // Notifications API
        .route(
            "/api/notifications",
            get(handlers::notifications::poll_notifications_handler),
        )
        // Search API
        .route(
            "/api/search",
            get(handlers::search::search_entries_handler),
        )
        .route(
            "/api/search/reindex",
            post(handlers::search::reindex_handler),
        )
        // Auth & contact API
        .route("/api/auth/login", post(handlers::auth::login_handler))
        .route(
            "/api/auth/password-reset/request",
            post(handlers::auth::request_reset_handler),
        )
        .route(
            "/api/auth/password-reset/confirm",
            post(handlers::auth::confirm_reset_handler),
        )
        .route("/api/contact", post(handlers::auth::contact_handler))
        .with_state(state)
}
