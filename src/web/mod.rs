//! agora-web: JSON API server for the agora social content platform.
//!
//! Exposes users, the follow graph, content entries with comments and
//! likes, private messages with notification counters, and search over
//! entries, persisting everything in SQLite.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::index_client::HttpIndex;
use crate::mailer::{DisabledMailer, Mailer};
use crate::search::SearchSync;
use crate::storage::Storage;

use config::{Cli, Config};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, seed roles, start the server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("agora-web starting");
    info!(db = %config.db_path.display(), "opening database");

    let storage = Storage::open(&config.db_path).expect("failed to open database");
    storage.seed_roles().expect("failed to seed roles");

    let search = match &config.search_url {
        Some(url) => {
            info!(index = %url, "search index configured");
            SearchSync::new(Arc::new(HttpIndex::new(url, config.search_key.clone())))
        }
        None => {
            warn!("no search index configured; indexing runs in degraded (disabled) mode");
            SearchSync::disabled()
        }
    };

    // Mail delivery is an external collaborator; without one configured
    // the degraded mailer drops messages observably.
    let mailer: Arc<dyn Mailer> = Arc::new(DisabledMailer::default());

    match config.admin_email.as_deref() {
        Some(email) => info!(%email, "admin registration email set"),
        None => info!("no admin registration email set"),
    }

    let state: SharedState = Arc::new(Mutex::new(AppState {
        storage,
        search,
        mailer,
        admin_email: config.admin_email.clone(),
        contact_recipients: config.contact_recipients.clone(),
    }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    info!("agora-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
