//! Token Repository Port (Driven Port)
//!
//! Persistence of the single user's access token.

use chrono::{DateTime, Utc};

use crate::domain::session::StoredToken;

/// Token store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenStoreError {
    /// The database failed.
    #[error("token store error: {0}")]
    Database(String),

    /// A stored timestamp could not be parsed.
    #[error("corrupt timestamp in token store: {0}")]
    CorruptTimestamp(String),
}

/// Port for access token persistence.
///
/// Calls are short and local, so the port is synchronous.
#[cfg_attr(test, mockall::automock)]
pub trait TokenRepository: Send + Sync {
    /// Replace every stored token with `access_token` issued at `now`.
    fn save(&self, access_token: &str, now: DateTime<Utc>) -> Result<StoredToken, TokenStoreError>;

    /// Most recently created token still valid at `now`.
    fn latest_valid(&self, now: DateTime<Utc>) -> Result<Option<StoredToken>, TokenStoreError>;

    /// Most recently created token, valid or not.
    fn latest(&self) -> Result<Option<StoredToken>, TokenStoreError>;

    /// Delete tokens expired at `now`; returns the number removed.
    fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, TokenStoreError>;

    /// Check that the store is reachable.
    fn ping(&self) -> Result<(), TokenStoreError>;
}
