//! Persistence Adapters
//!
//! SQLite storage for the access token.

mod token_store;

pub use token_store::SqliteTokenStore;
