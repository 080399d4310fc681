//! SQLite Token Store
//!
//! Implements [`TokenRepository`] on a single `tokens` table. Timestamps are
//! stored as fixed-width RFC 3339 UTC strings so they compare correctly as
//! text.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::application::ports::{TokenRepository, TokenStoreError};
use crate::domain::session::{StoredToken, expiry_after};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tokens (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    access_token TEXT    NOT NULL UNIQUE,
    created_at   TEXT    NOT NULL,
    expired_at   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tokens_expired_at ON tokens (expired_at);
";

const SELECT_COLUMNS: &str = "SELECT id, access_token, created_at, expired_at FROM tokens";

impl From<rusqlite::Error> for TokenStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Database(error.to_string())
    }
}

/// Token store backed by SQLite.
#[derive(Clone)]
pub struct SqliteTokenStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteTokenStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TokenStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TokenStoreError::Database(format!("{}: {e}", parent.display())))?;
        }

        tracing::info!(path = %path.display(), "Opening token store");
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Self::with_connection(connection)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, TokenStoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self, TokenStoreError> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn query_one(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<StoredToken>, TokenStoreError> {
        let connection = self.connection.lock();
        let row = connection
            .query_row(sql, params, TokenRow::from_row)
            .optional()?;
        row.map(StoredToken::try_from).transpose()
    }
}

impl std::fmt::Debug for SqliteTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTokenStore").finish_non_exhaustive()
    }
}

impl TokenRepository for SqliteTokenStore {
    fn save(&self, access_token: &str, now: DateTime<Utc>) -> Result<StoredToken, TokenStoreError> {
        let expired_at = expiry_after(now);
        let mut connection = self.connection.lock();
        let tx = connection.transaction()?;
        let replaced = tx.execute("DELETE FROM tokens", [])?;
        tx.execute(
            "INSERT INTO tokens (access_token, created_at, expired_at) VALUES (?1, ?2, ?3)",
            params![access_token, encode_time(now), encode_time(expired_at)],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(id, replaced, expired_at = %expired_at, "Stored access token");
        Ok(StoredToken {
            id,
            access_token: access_token.to_string(),
            created_at: now,
            expired_at,
        })
    }

    fn latest_valid(&self, now: DateTime<Utc>) -> Result<Option<StoredToken>, TokenStoreError> {
        self.query_one(
            &format!(
                "{SELECT_COLUMNS} WHERE expired_at > ?1 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            params![encode_time(now)],
        )
    }

    fn latest(&self) -> Result<Option<StoredToken>, TokenStoreError> {
        self.query_one(
            &format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT 1"),
            [],
        )
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, TokenStoreError> {
        let connection = self.connection.lock();
        let removed = connection.execute(
            "DELETE FROM tokens WHERE expired_at <= ?1",
            params![encode_time(now)],
        )?;
        if removed > 0 {
            tracing::info!(removed, "Deleted expired access tokens");
        }
        Ok(removed)
    }

    fn ping(&self) -> Result<(), TokenStoreError> {
        let connection = self.connection.lock();
        connection.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

struct TokenRow {
    id: i64,
    access_token: String,
    created_at: String,
    expired_at: String,
}

impl TokenRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            access_token: row.get(1)?,
            created_at: row.get(2)?,
            expired_at: row.get(3)?,
        })
    }
}

impl TryFrom<TokenRow> for StoredToken {
    type Error = TokenStoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            access_token: row.access_token,
            created_at: decode_time(&row.created_at)?,
            expired_at: decode_time(&row.expired_at)?,
        })
    }
}

fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(text: &str) -> Result<DateTime<Utc>, TokenStoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TokenStoreError::CorruptTimestamp(format!("{text}: {e}")))
}
