//! SQLite storage layer for agora.
//!
//! Owns the schema and all reads/writes for users, roles, the follow
//! graph, content entries and comments, likes, direct messages,
//! notifications, and password-reset tokens. Multi-statement operations
//! run inside a single SQLite transaction; everything else is one
//! autocommitted statement.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::roles::{Permission, BUILTIN_ROLES};

/// Notification name used for the private-message unread counter.
pub const UNREAD_MESSAGE_COUNT: &str = "unread_message_count";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Map a unique/foreign-key violation to [`StorageError::Conflict`] so
/// callers can answer duplicate registrations without string-matching.
fn map_constraint(err: rusqlite::Error, what: &str) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::Conflict(what.to_string())
        }
        other => StorageError::Sqlite(other),
    }
}

#[derive(Debug, Error)]
#[error("unknown kind: {0}")]
pub struct ParseKindError(pub String);

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Content family tag. The three families share one table, one comment
/// table, and one like table; the tag is all that distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Post,
    Blog,
    Platform,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Post => "post",
            EntryKind::Blog => "blog",
            EntryKind::Platform => "platform",
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(EntryKind::Post),
            "blog" => Ok(EntryKind::Blog),
            "platform" => Ok(EntryKind::Platform),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// What a like points at: a content entry of some kind, or a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Post,
    Blog,
    Platform,
    Comment,
}

impl LikeTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            LikeTarget::Post => "post",
            LikeTarget::Blog => "blog",
            LikeTarget::Platform => "platform",
            LikeTarget::Comment => "comment",
        }
    }
}

impl From<EntryKind> for LikeTarget {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Post => LikeTarget::Post,
            EntryKind::Blog => LikeTarget::Blog,
            EntryKind::Platform => LikeTarget::Platform,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
    pub permissions: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub role_id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub about_me: Option<String>,
    pub web_url: Option<String>,
    pub avatar_file: String,
    pub member_since: u64,
    pub last_seen: u64,
    pub last_message_read_time: Option<u64>,
}

/// Fields required to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Optional account fields; `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub about_me: Option<String>,
    pub web_url: Option<String>,
    pub avatar_file: Option<String>,
}

/// One row of a follower/followed listing.
#[derive(Debug, Clone, Serialize)]
pub struct FollowListItem {
    pub user_id: i64,
    pub username: String,
    pub followed_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryRow {
    pub id: i64,
    pub kind: EntryKind,
    pub author_id: i64,
    pub city: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub summary: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub kind: EntryKind,
    pub author_id: i64,
    pub city: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryUpdate {
    pub city: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentRow {
    pub id: i64,
    pub entry_id: i64,
    pub author_id: i64,
    pub body: String,
    pub disabled: bool,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub body: String,
    pub created_at: u64,
}

/// Which side of a user's message history to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBox {
    Received,
    Sent,
}

/// Latest-value-wins named signal. At most one live row exists per
/// (user, name); every write replaces the previous one.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Wall-clock seconds with sub-second precision, so clients can poll
    /// with a strictly-greater cutoff.
    pub created_at: f64,
    pub payload: String,
}

impl NotificationRow {
    pub fn data(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

const USER_COLUMNS: &str = "id, role_id, username, email, password_hash, first_name, last_name,
     about_me, web_url, avatar_file, member_since, last_seen, last_message_read_time";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        role_id: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        about_me: row.get(7)?,
        web_url: row.get(8)?,
        avatar_file: row.get(9)?,
        member_since: row.get::<_, i64>(10)? as u64,
        last_seen: row.get::<_, i64>(11)? as u64,
        last_message_read_time: row.get::<_, Option<i64>>(12)?.map(|t| t as u64),
    })
}

const ENTRY_COLUMNS: &str = "id, kind, author_id, city, category, title, body, summary, created_at";

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    let kind: String = row.get(1)?;
    let kind = kind.parse::<EntryKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(EntryRow {
        id: row.get(0)?,
        kind,
        author_id: row.get(2)?,
        city: row.get(3)?,
        category: row.get(4)?,
        title: row.get(5)?,
        body: row.get(6)?,
        summary: row.get(7)?,
        created_at: row.get::<_, i64>(8)? as u64,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        entry_id: row.get(1)?,
        author_id: row.get(2)?,
        body: row.get(3)?,
        disabled: row.get::<_, i32>(4)? != 0,
        created_at: row.get::<_, i64>(5)? as u64,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

fn notification_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        payload: row.get(4)?,
    })
}

// ---------------------------------------------------------------------------
// Clock helpers
// ---------------------------------------------------------------------------

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Notification timestamps keep sub-second precision so a client polling
/// "everything after T" never re-fetches the row it already saw.
fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database, used by tests and ephemeral tooling.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS roles (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                is_default  INTEGER NOT NULL DEFAULT 0,
                permissions INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS users (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                role_id                 INTEGER NOT NULL REFERENCES roles(id),
                username                TEXT NOT NULL UNIQUE,
                email                   TEXT NOT NULL UNIQUE,
                password_hash           TEXT NOT NULL,
                first_name              TEXT,
                last_name               TEXT,
                about_me                TEXT,
                web_url                 TEXT,
                avatar_file             TEXT NOT NULL DEFAULT 'default.jpg',
                member_since            INTEGER NOT NULL,
                last_seen               INTEGER NOT NULL,
                last_message_read_time  INTEGER
            );

            CREATE TABLE IF NOT EXISTS follows (
                follower_id INTEGER NOT NULL REFERENCES users(id),
                followed_id INTEGER NOT NULL REFERENCES users(id),
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (follower_id, followed_id)
            );

            CREATE INDEX IF NOT EXISTS idx_follows_followed
                ON follows(followed_id, created_at);

            CREATE TABLE IF NOT EXISTS entries (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                kind        TEXT NOT NULL,
                author_id   INTEGER NOT NULL REFERENCES users(id),
                city        TEXT NOT NULL,
                category    TEXT NOT NULL,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                summary     TEXT,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_kind
                ON entries(kind, created_at);
            CREATE INDEX IF NOT EXISTS idx_entries_author
                ON entries(author_id, created_at);

            CREATE TABLE IF NOT EXISTS comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id    INTEGER NOT NULL REFERENCES entries(id),
                author_id   INTEGER NOT NULL REFERENCES users(id),
                body        TEXT NOT NULL,
                disabled    INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_comments_entry
                ON comments(entry_id, created_at);

            -- The primary key is the duplicate-like guard: concurrent
            -- double-likes collapse to one row without any check-then-act.
            CREATE TABLE IF NOT EXISTS likes (
                user_id     INTEGER NOT NULL REFERENCES users(id),
                target_kind TEXT NOT NULL,
                target_id   INTEGER NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (user_id, target_kind, target_id)
            );

            CREATE INDEX IF NOT EXISTS idx_likes_target
                ON likes(target_kind, target_id);

            CREATE TABLE IF NOT EXISTS messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id    INTEGER NOT NULL REFERENCES users(id),
                recipient_id INTEGER NOT NULL REFERENCES users(id),
                body         TEXT NOT NULL,
                created_at   INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_recipient
                ON messages(recipient_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_sender
                ON messages(sender_id, created_at);

            CREATE TABLE IF NOT EXISTS notifications (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                name        TEXT NOT NULL,
                created_at  REAL NOT NULL,
                payload     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_user_name
                ON notifications(user_id, name);
            CREATE INDEX IF NOT EXISTS idx_notifications_user_time
                ON notifications(user_id, created_at);

            CREATE TABLE IF NOT EXISTS password_resets (
                token_hash  TEXT PRIMARY KEY,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                expires_at  INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    /// Upsert the builtin roles, resetting each mask to its canonical value.
    /// Safe to run on every startup.
    pub fn seed_roles(&self) -> Result<(), StorageError> {
        for role in BUILTIN_ROLES {
            self.conn.execute(
                "INSERT INTO roles (name, is_default, permissions) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                     is_default = excluded.is_default,
                     permissions = excluded.permissions",
                params![role.name, role.is_default as i32, role.mask() as i64],
            )?;
        }
        Ok(())
    }

    pub fn get_role(&self, id: i64) -> Result<Option<RoleRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, is_default, permissions FROM roles WHERE id = ?1",
                params![id],
                role_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_role_by_name(&self, name: &str) -> Result<Option<RoleRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, is_default, permissions FROM roles WHERE name = ?1",
                params![name],
                role_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Overwrite a role's permission mask. Role administration only; the
    /// builtin masks come back on the next [`Storage::seed_roles`].
    pub fn set_role_permissions(&self, id: i64, mask: u32) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE roles SET permissions = ?2 WHERE id = ?1",
            params![id, mask as i64],
        )?;
        Ok(affected > 0)
    }

    /// Whether the user's role grants the permission. An unknown user id
    /// holds no permissions at all.
    pub fn user_can(&self, user_id: i64, perm: Permission) -> Result<bool, StorageError> {
        let mask: Option<i64> = self
            .conn
            .query_row(
                "SELECT r.permissions FROM users u JOIN roles r ON r.id = u.role_id
                 WHERE u.id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(mask.is_some_and(|m| (m as u32) & perm.bit() == perm.bit()))
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Register a user. Assigns the Administrator role when the email
    /// matches the configured admin address, otherwise the default role,
    /// and seeds the self-follow edge, all in one transaction.
    pub fn create_user(
        &self,
        new: &NewUser,
        admin_email: Option<&str>,
    ) -> Result<UserRow, StorageError> {
        let now = now_secs();
        let tx = self.conn.unchecked_transaction()?;

        let role = if admin_email.is_some_and(|a| a.eq_ignore_ascii_case(&new.email)) {
            role_by_name(&tx, "Administrator")?
        } else {
            default_role(&tx)?
        };

        tx.execute(
            "INSERT INTO users
             (role_id, username, email, password_hash, first_name, last_name,
              member_since, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                role.id,
                new.username,
                new.email,
                new.password_hash,
                new.first_name,
                new.last_name,
                now as i64,
                now as i64,
            ],
        )
        .map_err(|e| map_constraint(e, "username or email already taken"))?;
        let user_id = tx.last_insert_rowid();

        // Every account follows itself so its own entries show up in its feed.
        tx.execute(
            "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at)
             VALUES (?1, ?1, ?2)",
            params![user_id, now as i64],
        )?;

        tx.commit()?;
        self.get_user(user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], user_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
        let row = self
            .conn
            .query_row(&sql, params![username], user_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        let row = self
            .conn
            .query_row(&sql, params![email], user_from_row)
            .optional()?;
        Ok(row)
    }

    /// Apply the non-`None` fields of an account update.
    pub fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<bool, StorageError> {
        let affected = self
            .conn
            .execute(
                "UPDATE users SET
                     username    = COALESCE(?2, username),
                     email       = COALESCE(?3, email),
                     first_name  = COALESCE(?4, first_name),
                     last_name   = COALESCE(?5, last_name),
                     about_me    = COALESCE(?6, about_me),
                     web_url     = COALESCE(?7, web_url),
                     avatar_file = COALESCE(?8, avatar_file)
                 WHERE id = ?1",
                params![
                    id,
                    update.username,
                    update.email,
                    update.first_name,
                    update.last_name,
                    update.about_me,
                    update.web_url,
                    update.avatar_file,
                ],
            )
            .map_err(|e| map_constraint(e, "username or email already taken"))?;
        Ok(affected > 0)
    }

    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1",
            params![id, password_hash],
        )?;
        Ok(affected > 0)
    }

    pub fn touch_last_seen(&self, id: i64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users SET last_seen = ?2 WHERE id = ?1",
            params![id, now_secs() as i64],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Follow graph
    // -----------------------------------------------------------------------

    /// Add a follow edge. Returns true if the edge is new; a duplicate
    /// follow is a no-op, not an error.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![follower_id, followed_id, now_secs() as i64],
        )?;
        Ok(affected > 0)
    }

    /// Remove a follow edge if present.
    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
            params![follower_id, followed_id],
        )?;
        Ok(affected > 0)
    }

    pub fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
            params![follower_id, followed_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool, StorageError> {
        self.is_following(other_id, user_id)
    }

    /// Page through the users following `user_id`, oldest edge first.
    /// The self-follow edge is bookkeeping, not a social fact, and is
    /// excluded from listings and counts.
    pub fn list_followers(
        &self,
        user_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<FollowListItem>, StorageError> {
        self.list_follow_edges(user_id, "followed_id", "follower_id", page, per_page)
    }

    /// Page through the users that `user_id` follows, oldest edge first.
    pub fn list_following(
        &self,
        user_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<FollowListItem>, StorageError> {
        self.list_follow_edges(user_id, "follower_id", "followed_id", page, per_page)
    }

    fn list_follow_edges(
        &self,
        user_id: i64,
        fixed_col: &str,
        listed_col: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<FollowListItem>, StorageError> {
        let sql = format!(
            "SELECT u.id, u.username, f.created_at
             FROM follows f JOIN users u ON u.id = f.{listed_col}
             WHERE f.{fixed_col} = ?1 AND f.follower_id != f.followed_id
             ORDER BY f.created_at ASC, u.id ASC
             LIMIT ?2 OFFSET ?3",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![user_id, per_page as i64, page_offset(page, per_page)],
            |row| {
                Ok(FollowListItem {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    followed_at: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// (followers, following) counts, excluding the self-follow edge.
    pub fn follow_counts(&self, user_id: i64) -> Result<(u32, u32), StorageError> {
        let followers: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM follows
             WHERE followed_id = ?1 AND follower_id != followed_id",
            params![user_id],
            |row| row.get(0),
        )?;
        let following: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM follows
             WHERE follower_id = ?1 AND follower_id != followed_id",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok((followers as u32, following as u32))
    }

    // -----------------------------------------------------------------------
    // Likes
    // -----------------------------------------------------------------------

    /// Record a like. Liking twice is a no-op; the table's primary key
    /// absorbs concurrent duplicates. Returns true if the fact is new.
    pub fn like(
        &self,
        user_id: i64,
        target: LikeTarget,
        target_id: i64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO likes (user_id, target_kind, target_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, target.as_str(), target_id, now_secs() as i64],
        )?;
        Ok(affected > 0)
    }

    /// Remove a like if present; unliking something never liked is a no-op.
    pub fn unlike(
        &self,
        user_id: i64,
        target: LikeTarget,
        target_id: i64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3",
            params![user_id, target.as_str(), target_id],
        )?;
        Ok(affected > 0)
    }

    pub fn has_liked(
        &self,
        user_id: i64,
        target: LikeTarget,
        target_id: i64,
    ) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM likes
             WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3",
            params![user_id, target.as_str(), target_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count_likes(&self, target: LikeTarget, target_id: i64) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE target_kind = ?1 AND target_id = ?2",
            params![target.as_str(), target_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    pub fn insert_entry(&self, new: &NewEntry) -> Result<EntryRow, StorageError> {
        self.conn.execute(
            "INSERT INTO entries (kind, author_id, city, category, title, body, summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.kind.as_str(),
                new.author_id,
                new.city,
                new.category,
                new.title,
                new.body,
                new.summary,
                now_secs() as i64,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_entry(id)?
            .ok_or_else(|| StorageError::NotFound(format!("entry {id}")))
    }

    pub fn get_entry(&self, id: i64) -> Result<Option<EntryRow>, StorageError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], entry_from_row)
            .optional()?;
        Ok(row)
    }

    /// Apply the non-`None` fields and return the updated row, or `None`
    /// if the entry doesn't exist.
    pub fn update_entry(
        &self,
        id: i64,
        update: &EntryUpdate,
    ) -> Result<Option<EntryRow>, StorageError> {
        let affected = self.conn.execute(
            "UPDATE entries SET
                 city     = COALESCE(?2, city),
                 category = COALESCE(?3, category),
                 title    = COALESCE(?4, title),
                 body     = COALESCE(?5, body),
                 summary  = COALESCE(?6, summary)
             WHERE id = ?1",
            params![
                id,
                update.city,
                update.category,
                update.title,
                update.body,
                update.summary,
            ],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_entry(id)
    }

    /// Delete an entry together with its comments and every like pointing
    /// at it or at its comments, in one transaction.
    pub fn delete_entry(&self, id: i64) -> Result<bool, StorageError> {
        let Some(entry) = self.get_entry(id)? else {
            return Ok(false);
        };
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM likes WHERE target_kind = 'comment'
             AND target_id IN (SELECT id FROM comments WHERE entry_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM likes WHERE target_kind = ?1 AND target_id = ?2",
            params![LikeTarget::from(entry.kind).as_str(), id],
        )?;
        tx.execute("DELETE FROM comments WHERE entry_id = ?1", params![id])?;
        tx.execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(true)
    }

    /// List entries newest first, optionally restricted to one kind or
    /// one author.
    pub fn list_entries(
        &self,
        kind: Option<EntryKind>,
        author_id: Option<i64>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<EntryRow>, StorageError> {
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE 1=1");
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(k) = kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Box::new(k.as_str().to_string()));
        }
        if let Some(a) = author_id {
            sql.push_str(" AND author_id = ?");
            bind_values.push(Box::new(a));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
        bind_values.push(Box::new(per_page as i64));
        bind_values.push(Box::new(page_offset(page, per_page)));

        let mut stmt = self.conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), entry_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Load entries by id, preserving the input order. Missing ids are
    /// skipped; the search index may be ahead of or behind the store.
    pub fn entries_by_ids(&self, ids: &[i64]) -> Result<Vec<EntryRow>, StorageError> {
        let mut result = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(entry) = self.get_entry(id)? {
                result.push(entry);
            }
        }
        Ok(result)
    }

    /// Every entry, oldest first. Feeds [`crate::search::SearchSync::reindex`].
    pub fn all_entries(&self) -> Result<Vec<EntryRow>, StorageError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], entry_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    pub fn insert_comment(
        &self,
        entry_id: i64,
        author_id: i64,
        body: &str,
    ) -> Result<CommentRow, StorageError> {
        self.conn.execute(
            "INSERT INTO comments (entry_id, author_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry_id, author_id, body, now_secs() as i64],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_comment(id)?
            .ok_or_else(|| StorageError::NotFound(format!("comment {id}")))
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, entry_id, author_id, body, disabled, created_at
                 FROM comments WHERE id = ?1",
                params![id],
                comment_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List an entry's comments, oldest first. Disabled comments are
    /// hidden unless the caller (a moderator view) asks for them.
    pub fn list_comments(
        &self,
        entry_id: i64,
        include_disabled: bool,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CommentRow>, StorageError> {
        let mut sql = String::from(
            "SELECT id, entry_id, author_id, body, disabled, created_at
             FROM comments WHERE entry_id = ?1",
        );
        if !include_disabled {
            sql.push_str(" AND disabled = 0");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![entry_id, per_page as i64, page_offset(page, per_page)],
            comment_from_row,
        )?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Visible comments on an entry.
    pub fn count_comments(&self, entry_id: i64) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE entry_id = ?1 AND disabled = 0",
            params![entry_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Moderation switch; a disabled comment stays in place but is hidden
    /// from normal listings.
    pub fn set_comment_disabled(&self, id: i64, disabled: bool) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE comments SET disabled = ?2 WHERE id = ?1",
            params![id, disabled as i32],
        )?;
        Ok(affected > 0)
    }

    /// Delete a comment and any likes pointing at it.
    pub fn delete_comment(&self, id: i64) -> Result<bool, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM likes WHERE target_kind = 'comment' AND target_id = ?1",
            params![id],
        )?;
        let affected = tx.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Messages & notifications
    // -----------------------------------------------------------------------

    /// Deliver a private message: insert the row, recompute the recipient's
    /// unread count, and refresh their counter notification in one
    /// transaction, so the counter can never miss the message it counts.
    pub fn send_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        body: &str,
    ) -> Result<(MessageRow, u32), StorageError> {
        let now = now_secs();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO messages (sender_id, recipient_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![sender_id, recipient_id, body, now as i64],
        )?;
        let id = tx.last_insert_rowid();
        let unread = unread_count_on(&tx, recipient_id)?;
        replace_notification(
            &tx,
            recipient_id,
            UNREAD_MESSAGE_COUNT,
            &serde_json::json!(unread),
            now_ts(),
        )?;
        tx.commit()?;

        let row = MessageRow {
            id,
            sender_id,
            recipient_id,
            body: body.to_string(),
            created_at: now,
        };
        Ok((row, unread))
    }

    /// Messages to `user_id` newer than their last feed read. A user who
    /// has never read the feed counts everything.
    pub fn unread_count(&self, user_id: i64) -> Result<u32, StorageError> {
        unread_count_on(&self.conn, user_id)
    }

    /// Page through one side of a user's message history, oldest first.
    pub fn list_messages(
        &self,
        user_id: i64,
        mbox: MessageBox,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let col = match mbox {
            MessageBox::Received => "recipient_id",
            MessageBox::Sent => "sender_id",
        };
        let sql = format!(
            "SELECT id, sender_id, recipient_id, body, created_at
             FROM messages WHERE {col} = ?1
             ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![user_id, per_page as i64, page_offset(page, per_page)],
            message_from_row,
        )?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Mark the whole message feed read: advance `last_message_read_time`
    /// and zero the counter notification in the same transaction.
    pub fn mark_messages_read(&self, user_id: i64) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let affected = tx.execute(
            "UPDATE users SET last_message_read_time = ?2 WHERE id = ?1",
            params![user_id, now_secs() as i64],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("user {user_id}")));
        }
        replace_notification(
            &tx,
            user_id,
            UNREAD_MESSAGE_COUNT,
            &serde_json::json!(0),
            now_ts(),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Publish a named notification, replacing any previous value under
    /// the same name. Latest value wins; this is not an append-only log.
    pub fn set_notification(
        &self,
        user_id: i64,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<NotificationRow, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let row = replace_notification(&tx, user_id, name, payload, now_ts())?;
        tx.commit()?;
        Ok(row)
    }

    /// Notifications for `user_id` strictly newer than `since`, ascending.
    /// Each call is a fresh point-in-time snapshot.
    pub fn notifications_since(
        &self,
        user_id: i64,
        since: f64,
    ) -> Result<Vec<NotificationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, created_at, payload
             FROM notifications WHERE user_id = ?1 AND created_at > ?2
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id, since], notification_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Live rows under a (user, name) pair. The replace discipline keeps
    /// this at zero or one; tests lean on it.
    pub fn count_notifications(&self, user_id: i64, name: &str) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND name = ?2",
            params![user_id, name],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    // -----------------------------------------------------------------------
    // Password resets
    // -----------------------------------------------------------------------

    /// Store a reset-token hash, displacing any earlier token for the user.
    pub fn store_reset_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: u64,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM password_resets WHERE user_id = ?1",
            params![user_id],
        )?;
        tx.execute(
            "INSERT INTO password_resets (token_hash, user_id, expires_at)
             VALUES (?1, ?2, ?3)",
            params![token_hash, user_id, expires_at as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Redeem a reset token. The row is deleted whether or not it is still
    /// valid, so a token can never be tried twice.
    pub fn consume_reset_token(&self, token_hash: &str) -> Result<Option<i64>, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let found: Option<(i64, i64)> = tx
            .query_row(
                "SELECT user_id, expires_at FROM password_resets WHERE token_hash = ?1",
                params![token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((user_id, expires_at)) = found else {
            return Ok(None);
        };
        tx.execute(
            "DELETE FROM password_resets WHERE token_hash = ?1",
            params![token_hash],
        )?;
        tx.commit()?;
        if (expires_at as u64) < now_secs() {
            return Ok(None);
        }
        Ok(Some(user_id))
    }
}

// ---------------------------------------------------------------------------
// Shared statement helpers (usable inside a transaction)
// ---------------------------------------------------------------------------

fn role_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoleRow> {
    Ok(RoleRow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_default: row.get::<_, i32>(2)? != 0,
        permissions: row.get::<_, i64>(3)? as u32,
    })
}

fn role_by_name(conn: &Connection, name: &str) -> Result<RoleRow, StorageError> {
    conn.query_row(
        "SELECT id, name, is_default, permissions FROM roles WHERE name = ?1",
        params![name],
        role_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("role {name}")))
}

fn default_role(conn: &Connection) -> Result<RoleRow, StorageError> {
    conn.query_row(
        "SELECT id, name, is_default, permissions FROM roles WHERE is_default = 1",
        params![],
        role_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound("default role; run role seeding".to_string()))
}

fn unread_count_on(conn: &Connection, user_id: i64) -> Result<u32, StorageError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE recipient_id = ?1
           AND created_at > COALESCE(
               (SELECT last_message_read_time FROM users WHERE id = ?1), 0)",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

fn replace_notification(
    conn: &Connection,
    user_id: i64,
    name: &str,
    payload: &serde_json::Value,
    ts: f64,
) -> Result<NotificationRow, StorageError> {
    conn.execute(
        "DELETE FROM notifications WHERE user_id = ?1 AND name = ?2",
        params![user_id, name],
    )?;
    let payload_json = serde_json::to_string(payload)?;
    conn.execute(
        "INSERT INTO notifications (user_id, name, created_at, payload)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, name, ts, payload_json],
    )?;
    Ok(NotificationRow {
        id: conn.last_insert_rowid(),
        user_id,
        name: name.to_string(),
        created_at: ts,
        payload: payload_json,
    })
}

fn page_offset(page: u32, per_page: u32) -> i64 {
    (page.max(1) as i64 - 1) * per_page as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_storage() -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        storage.seed_roles().unwrap();
        storage
    }

    fn mk_user(storage: &Storage, name: &str) -> UserRow {
        storage
            .create_user(
                &NewUser {
                    username: name.to_string(),
                    email: format!("{name}@example.com"),
                    password_hash: "00$ff".to_string(),
                    first_name: None,
                    last_name: None,
                },
                None,
            )
            .unwrap()
    }

    fn mk_entry(storage: &Storage, author: &UserRow, kind: EntryKind, title: &str) -> EntryRow {
        storage
            .insert_entry(&NewEntry {
                kind,
                author_id: author.id,
                city: "Delft".to_string(),
                category: "general".to_string(),
                title: title.to_string(),
                body: format!("{title} body"),
                summary: None,
            })
            .unwrap()
    }

    #[test]
    fn test_seed_roles_idempotent() {
        let storage = test_storage();
        storage.seed_roles().unwrap();

        let user_role = storage.get_role_by_name("User").unwrap().unwrap();
        assert!(user_role.is_default);
        assert_eq!(user_role.permissions, 1 + 2 + 4);

        let admin = storage.get_role_by_name("Administrator").unwrap().unwrap();
        assert!(!admin.is_default);
        assert_eq!(admin.permissions, 1 + 2 + 4 + 16);
    }

    #[test]
    fn test_seed_restores_canonical_mask() {
        let storage = test_storage();
        let moderator = storage.get_role_by_name("Moderator").unwrap().unwrap();
        assert!(storage.set_role_permissions(moderator.id, 0).unwrap());

        storage.seed_roles().unwrap();
        let moderator = storage.get_role_by_name("Moderator").unwrap().unwrap();
        assert_eq!(moderator.permissions, 1 + 2 + 4 + 8);
    }

    #[test]
    fn test_create_user_defaults_and_self_follow() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");

        let role = storage.get_role(alice.role_id).unwrap().unwrap();
        assert_eq!(role.name, "User");

        // Self-follow edge exists from the moment of creation.
        assert!(storage.is_following(alice.id, alice.id).unwrap());
        assert!(storage.user_can(alice.id, Permission::Write).unwrap());
        assert!(!storage.user_can(alice.id, Permission::Admin).unwrap());
    }

    #[test]
    fn test_create_user_admin_email_gets_admin_role() {
        let storage = test_storage();
        let root = storage
            .create_user(
                &NewUser {
                    username: "root".to_string(),
                    email: "admin@example.com".to_string(),
                    password_hash: "00$ff".to_string(),
                    first_name: None,
                    last_name: None,
                },
                Some("Admin@Example.com"),
            )
            .unwrap();
        assert!(storage.user_can(root.id, Permission::Admin).unwrap());
    }

    #[test]
    fn test_duplicate_username_is_conflict() {
        let storage = test_storage();
        mk_user(&storage, "alice");
        let err = storage
            .create_user(
                &NewUser {
                    username: "alice".to_string(),
                    email: "other@example.com".to_string(),
                    password_hash: "00$ff".to_string(),
                    first_name: None,
                    last_name: None,
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn test_update_profile_partial() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        assert!(storage
            .update_profile(
                alice.id,
                &ProfileUpdate {
                    about_me: Some("hello".to_string()),
                    ..Default::default()
                },
            )
            .unwrap());

        let alice = storage.get_user(alice.id).unwrap().unwrap();
        assert_eq!(alice.about_me.as_deref(), Some("hello"));
        assert_eq!(alice.username, "alice");
    }

    #[test]
    fn test_unknown_user_has_no_permissions() {
        let storage = test_storage();
        assert!(!storage.user_can(999, Permission::Follow).unwrap());
    }

    #[test]
    fn test_follow_round_trip() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let bob = mk_user(&storage, "bob");

        assert!(!storage.is_following(alice.id, bob.id).unwrap());
        assert!(storage.follow(alice.id, bob.id).unwrap());
        // Duplicate follow is a no-op.
        assert!(!storage.follow(alice.id, bob.id).unwrap());
        assert!(storage.is_following(alice.id, bob.id).unwrap());
        assert!(storage.is_followed_by(bob.id, alice.id).unwrap());
        // No symmetry.
        assert!(!storage.is_following(bob.id, alice.id).unwrap());

        assert!(storage.unfollow(alice.id, bob.id).unwrap());
        assert!(!storage.unfollow(alice.id, bob.id).unwrap());
        assert!(!storage.is_following(alice.id, bob.id).unwrap());
    }

    #[test]
    fn test_follow_listing_excludes_self_edge() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let bob = mk_user(&storage, "bob");
        let carol = mk_user(&storage, "carol");

        storage.follow(bob.id, alice.id).unwrap();
        storage.follow(carol.id, alice.id).unwrap();

        let followers = storage.list_followers(alice.id, 1, 50).unwrap();
        let names: Vec<&str> = followers.iter().map(|f| f.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);

        let (follower_count, following_count) = storage.follow_counts(alice.id).unwrap();
        assert_eq!(follower_count, 2);
        assert_eq!(following_count, 0);

        // Pagination.
        let first = storage.list_followers(alice.id, 1, 1).unwrap();
        let second = storage.list_followers(alice.id, 2, 1).unwrap();
        assert_eq!(first[0].username, "bob");
        assert_eq!(second[0].username, "carol");
    }

    #[test]
    fn test_like_is_idempotent() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let post = mk_entry(&storage, &alice, EntryKind::Post, "First");

        assert!(storage.like(alice.id, LikeTarget::Post, post.id).unwrap());
        assert!(!storage.like(alice.id, LikeTarget::Post, post.id).unwrap());
        assert!(storage
            .has_liked(alice.id, LikeTarget::Post, post.id)
            .unwrap());
        assert_eq!(storage.count_likes(LikeTarget::Post, post.id).unwrap(), 1);

        assert!(storage.unlike(alice.id, LikeTarget::Post, post.id).unwrap());
        assert!(!storage.unlike(alice.id, LikeTarget::Post, post.id).unwrap());
        assert!(!storage
            .has_liked(alice.id, LikeTarget::Post, post.id)
            .unwrap());
        assert_eq!(storage.count_likes(LikeTarget::Post, post.id).unwrap(), 0);
    }

    #[test]
    fn test_like_kinds_are_distinct() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let post = mk_entry(&storage, &alice, EntryKind::Post, "First");
        let comment = storage.insert_comment(post.id, alice.id, "nice").unwrap();

        // Same numeric id under different kinds must not collide.
        storage.like(alice.id, LikeTarget::Post, post.id).unwrap();
        storage
            .like(alice.id, LikeTarget::Comment, comment.id)
            .unwrap();
        assert_eq!(storage.count_likes(LikeTarget::Post, post.id).unwrap(), 1);
        assert_eq!(
            storage.count_likes(LikeTarget::Comment, comment.id).unwrap(),
            1
        );

        storage.unlike(alice.id, LikeTarget::Post, post.id).unwrap();
        assert!(storage
            .has_liked(alice.id, LikeTarget::Comment, comment.id)
            .unwrap());
    }

    #[test]
    fn test_entry_crud_and_listing() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let post = mk_entry(&storage, &alice, EntryKind::Post, "A post");
        let blog = mk_entry(&storage, &alice, EntryKind::Blog, "A blog");

        let loaded = storage.get_entry(post.id).unwrap().unwrap();
        assert_eq!(loaded.kind, EntryKind::Post);
        assert_eq!(loaded.title, "A post");

        let updated = storage
            .update_entry(
                blog.id,
                &EntryUpdate {
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.body, "A blog body");

        assert!(storage
            .update_entry(9999, &EntryUpdate::default())
            .unwrap()
            .is_none());

        let posts = storage
            .list_entries(Some(EntryKind::Post), None, 1, 50)
            .unwrap();
        assert_eq!(posts.len(), 1);
        let all = storage.list_entries(None, None, 1, 50).unwrap();
        assert_eq!(all.len(), 2);
        let by_author = storage.list_entries(None, Some(alice.id), 1, 50).unwrap();
        assert_eq!(by_author.len(), 2);
    }

    #[test]
    fn test_delete_entry_cascades() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let bob = mk_user(&storage, "bob");
        let post = mk_entry(&storage, &alice, EntryKind::Post, "Doomed");
        let comment = storage.insert_comment(post.id, bob.id, "rip").unwrap();
        storage.like(bob.id, LikeTarget::Post, post.id).unwrap();
        storage
            .like(alice.id, LikeTarget::Comment, comment.id)
            .unwrap();

        assert!(storage.delete_entry(post.id).unwrap());
        assert!(!storage.delete_entry(post.id).unwrap());
        assert!(storage.get_entry(post.id).unwrap().is_none());
        assert!(storage.get_comment(comment.id).unwrap().is_none());
        assert_eq!(storage.count_likes(LikeTarget::Post, post.id).unwrap(), 0);
        assert_eq!(
            storage.count_likes(LikeTarget::Comment, comment.id).unwrap(),
            0
        );
    }

    #[test]
    fn test_comment_moderation() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let post = mk_entry(&storage, &alice, EntryKind::Post, "Busy");
        let keep = storage.insert_comment(post.id, alice.id, "fine").unwrap();
        let hide = storage.insert_comment(post.id, alice.id, "spam").unwrap();

        assert!(storage.set_comment_disabled(hide.id, true).unwrap());

        let visible = storage.list_comments(post.id, false, 1, 50).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, keep.id);
        assert_eq!(storage.count_comments(post.id).unwrap(), 1);

        let all = storage.list_comments(post.id, true, 1, 50).unwrap();
        assert_eq!(all.len(), 2);

        assert!(storage.set_comment_disabled(hide.id, false).unwrap());
        assert_eq!(
            storage.list_comments(post.id, false, 1, 50).unwrap().len(),
            2
        );

        assert!(storage.delete_comment(keep.id).unwrap());
        assert!(!storage.delete_comment(keep.id).unwrap());
    }

    #[test]
    fn test_send_message_refreshes_counter() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let bob = mk_user(&storage, "bob");

        let (msg, unread) = storage.send_message(alice.id, bob.id, "hello").unwrap();
        assert_eq!(msg.body, "hello");
        assert_eq!(unread, 1);
        assert_eq!(storage.unread_count(bob.id).unwrap(), 1);

        let notifications = storage.notifications_since(bob.id, 0.0).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].name, UNREAD_MESSAGE_COUNT);
        assert_eq!(notifications[0].data(), serde_json::json!(1));
    }

    #[test]
    fn test_unread_count_and_mark_read() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let bob = mk_user(&storage, "bob");

        for body in ["one", "two", "three"] {
            storage.send_message(alice.id, bob.id, body).unwrap();
        }
        assert_eq!(storage.unread_count(bob.id).unwrap(), 3);
        // Sender's own feed is untouched.
        assert_eq!(storage.unread_count(alice.id).unwrap(), 0);

        storage.mark_messages_read(bob.id).unwrap();
        assert_eq!(storage.unread_count(bob.id).unwrap(), 0);

        let notifications = storage.notifications_since(bob.id, 0.0).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].data(), serde_json::json!(0));

        let received = storage
            .list_messages(bob.id, MessageBox::Received, 1, 50)
            .unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0].body, "one");
        let sent = storage
            .list_messages(alice.id, MessageBox::Sent, 1, 50)
            .unwrap();
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn test_set_notification_replaces_not_appends() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");

        storage
            .set_notification(alice.id, UNREAD_MESSAGE_COUNT, &serde_json::json!(3))
            .unwrap();
        let replaced = storage
            .set_notification(alice.id, UNREAD_MESSAGE_COUNT, &serde_json::json!(5))
            .unwrap();
        assert_eq!(replaced.data(), serde_json::json!(5));

        assert_eq!(
            storage
                .count_notifications(alice.id, UNREAD_MESSAGE_COUNT)
                .unwrap(),
            1
        );
        let rows = storage.notifications_since(alice.id, 0.0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data(), serde_json::json!(5));

        // Structured payloads pass through untouched.
        let fancy = storage
            .set_notification(alice.id, "digest", &serde_json::json!({"new": [1, 2]}))
            .unwrap();
        assert_eq!(fancy.data(), serde_json::json!({"new": [1, 2]}));
    }

    #[test]
    fn test_notifications_since_is_strictly_greater() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");

        let first = storage
            .set_notification(alice.id, "a", &serde_json::json!(1))
            .unwrap();
        let second = storage
            .set_notification(alice.id, "b", &serde_json::json!(2))
            .unwrap();
        assert!(second.created_at >= first.created_at);

        let after_first = storage
            .notifications_since(alice.id, first.created_at)
            .unwrap();
        assert!(after_first.iter().all(|n| n.created_at > first.created_at));

        let none = storage
            .notifications_since(alice.id, second.created_at)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_reset_token_single_use() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");
        let expires = now_secs() + 600;

        storage
            .store_reset_token(alice.id, "hash-a", expires)
            .unwrap();
        assert_eq!(
            storage.consume_reset_token("hash-a").unwrap(),
            Some(alice.id)
        );
        // Second redemption fails: the row is gone.
        assert_eq!(storage.consume_reset_token("hash-a").unwrap(), None);
    }

    #[test]
    fn test_reset_token_expiry_and_displacement() {
        let storage = test_storage();
        let alice = mk_user(&storage, "alice");

        storage
            .store_reset_token(alice.id, "stale", now_secs() - 1)
            .unwrap();
        assert_eq!(storage.consume_reset_token("stale").unwrap(), None);

        // A new token displaces the old one.
        storage
            .store_reset_token(alice.id, "first", now_secs() + 600)
            .unwrap();
        storage
            .store_reset_token(alice.id, "second", now_secs() + 600)
            .unwrap();
        assert_eq!(storage.consume_reset_token("first").unwrap(), None);
        assert_eq!(
            storage.consume_reset_token("second").unwrap(),
            Some(alice.id)
        );
    }
}
