//! Configuration types and constants for the agora-web server.

use std::path::PathBuf;

use clap::Parser;

/// Default page size for entry, comment, and message listings.
pub(crate) const DEFAULT_PER_PAGE: u32 = 20;
pub(crate) const MAX_PER_PAGE: u32 = 100;
/// Page size for follower/followed listings.
pub(crate) const FOLLOWERS_PER_PAGE: u32 = 50;
/// Password-reset tokens are valid for 30 minutes.
pub(crate) const RESET_TOKEN_TTL_SECS: u64 = 1800;

/// JSON API server for the agora social content platform.
///
/// Users, roles, follow graph, likes, private messages with notification
/// counters, and a search side-index kept in sync with content entries.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "agora-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: AGORA_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Path to the SQLite database [env: AGORA_DB] [default: agora.db]
    #[arg(long, short = 'd')]
    pub db: Option<PathBuf>,

    /// Base URL of the external search index [env: AGORA_SEARCH_URL]
    #[arg(long)]
    pub search_url: Option<String>,

    /// API key for the search index [env: AGORA_SEARCH_KEY]
    #[arg(long)]
    pub search_key: Option<String>,

    /// Email address that registers with the Administrator role
    /// [env: AGORA_ADMIN_EMAIL]
    #[arg(long)]
    pub admin_email: Option<String>,

    /// Comma-separated recipients for contact-form mail
    /// [env: AGORA_CONTACT_RECIPIENTS]
    #[arg(long)]
    pub contact_recipients: Option<String>,
}

pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub search_url: Option<String>,
    pub search_key: Option<String>,
    pub admin_email: Option<String>,
    pub contact_recipients: Vec<String>,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("AGORA_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        let db_path = cli
            .db
            .or_else(|| std::env::var("AGORA_DB").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("agora.db"));

        let search_url = cli
            .search_url
            .or_else(|| std::env::var("AGORA_SEARCH_URL").ok());

        let search_key = cli
            .search_key
            .or_else(|| std::env::var("AGORA_SEARCH_KEY").ok());

        let admin_email = cli
            .admin_email
            .or_else(|| std::env::var("AGORA_ADMIN_EMAIL").ok());

        let contact_recipients = cli
            .contact_recipients
            .or_else(|| std::env::var("AGORA_CONTACT_RECIPIENTS").ok())
            .map(|s| {
                s.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_addr,
            db_path,
            search_url,
            search_key,
            admin_email,
            contact_recipients,
        }
    }
}
