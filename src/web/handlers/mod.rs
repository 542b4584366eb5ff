//! HTTP request handlers, grouped by resource.

pub mod auth;
pub mod comments;
pub mod entries;
pub mod follows;
pub mod health;
pub mod likes;
pub mod messages;
pub mod notifications;
pub mod search;
pub mod users;
