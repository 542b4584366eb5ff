pub mod credentials;
pub mod index_client;
pub mod mailer;
pub mod roles;
pub mod search;
pub mod storage;
pub mod web;
