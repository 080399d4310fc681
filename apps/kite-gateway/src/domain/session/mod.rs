//! Session Types
//!
//! Broker credentials for an authenticated session and the persisted access
//! token with its expiry rules.
//!
//! Kite access tokens are invalidated every morning, so a stored token is
//! treated as expired at 06:00 UTC on the day after it was issued.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;

/// Number of leading characters shown in a token preview.
const PREVIEW_CHARS: usize = 10;

// =============================================================================
// Credentials
// =============================================================================

/// API key and access token used to open a ticker session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    api_key: String,
    access_token: String,
}

impl SessionCredentials {
    /// Create credentials from an API key and an access token.
    #[must_use]
    pub fn new(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }

    /// The application's API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The user's access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("api_key", &self.api_key)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Stored Token
// =============================================================================

/// Expiry of a token issued at `now`: 06:00 UTC on the following day.
#[must_use]
pub fn expiry_after(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc() + TimeDelta::days(1) + TimeDelta::hours(6)
}

/// An access token as persisted by the token store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredToken {
    /// Row id.
    pub id: i64,
    /// Broker access token.
    pub access_token: String,
    /// When the token was saved.
    pub created_at: DateTime<Utc>,
    /// When the token stops being usable.
    pub expired_at: DateTime<Utc>,
}

impl StoredToken {
    /// Whether the token is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at > now
    }

    /// First characters of the token followed by an ellipsis.
    #[must_use]
    pub fn preview(&self) -> String {
        let head: String = self.access_token.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("id", &self.id)
            .field("access_token", &self.preview())
            .field("created_at", &self.created_at)
            .field("expired_at", &self.expired_at)
            .finish()
    }
}

// =============================================================================
// Token Info
// =============================================================================

/// Diagnostic view of the most recent stored token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TokenInfo {
    /// No token has ever been stored.
    Missing {
        /// Always `false`.
        exists: bool,
        /// Human readable explanation.
        message: String,
    },
    /// A token exists, valid or not.
    Present {
        /// Always `true`.
        exists: bool,
        /// Whether the token is still usable.
        is_valid: bool,
        /// Creation time, RFC 3339.
        created_at: String,
        /// Expiry time, RFC 3339.
        expired_at: String,
        /// `HH:MM:SS` until expiry, or `Expired`.
        time_remaining: String,
        /// Leading characters of the token.
        token_preview: String,
    },
}

impl TokenInfo {
    /// Info for an empty store.
    #[must_use]
    pub fn missing() -> Self {
        Self::Missing {
            exists: false,
            message: "No tokens in database".to_string(),
        }
    }

    /// Info describing `token` as seen at `now`.
    #[must_use]
    pub fn from_token(token: &StoredToken, now: DateTime<Utc>) -> Self {
        let is_valid = token.is_valid_at(now);
        let time_remaining = if is_valid {
            format_remaining(token.expired_at - now)
        } else {
            "Expired".to_string()
        };

        Self::Present {
            exists: true,
            is_valid,
            created_at: token.created_at.to_rfc3339(),
            expired_at: token.expired_at.to_rfc3339(),
            time_remaining,
            token_preview: token.preview(),
        }
    }
}

fn format_remaining(remaining: TimeDelta) -> String {
    let total = remaining.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
