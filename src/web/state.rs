//! Shared application state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::mailer::Mailer;
use crate::search::SearchSync;
use crate::storage::Storage;

pub struct AppState {
    pub storage: Storage,
    pub search: SearchSync,
    pub mailer: Arc<dyn Mailer>,
    /// Email that registers with the Administrator role.
    pub admin_email: Option<String>,
    /// Where contact-form mail goes.
    pub contact_recipients: Vec<String>,
}

pub type SharedState = Arc<Mutex<AppState>>;
