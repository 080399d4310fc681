//! Kite Connect Login
//!
//! The login flow is a browser redirect:
//!
//! 1. The user opens `{login_url}?v=3&api_key=...` and signs in.
//! 2. Kite redirects back with `request_token` and `status`.
//! 3. The gateway posts `api_key`, `request_token` and a checksum to
//!    `/session/token` and receives the access token.
//!
//! The checksum is the hex SHA-256 of `api_key + request_token + api_secret`.

use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::infrastructure::config::Credentials;

/// Kite Connect API version sent with every request.
pub const KITE_API_VERSION: &str = "3";

/// Checksum proving possession of the API secret for a request token.
#[must_use]
pub fn session_checksum(credentials: &Credentials, request_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credentials.api_key().as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(credentials.api_secret().as_bytes());
    hex::encode(hasher.finalize())
}

/// Login URL for the application.
#[must_use]
pub fn login_url(base: &str, api_key: &str) -> String {
    match Url::parse_with_params(base, &[("v", KITE_API_VERSION), ("api_key", api_key)]) {
        Ok(url) => url.into(),
        Err(_) => format!("{base}?v={KITE_API_VERSION}&api_key={api_key}"),
    }
}

/// Value of the `Authorization` header for an access token.
#[must_use]
pub fn authorization_header(api_key: &str, access_token: &str) -> String {
    format!("token {api_key}:{access_token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("api_key".to_string(), "secret".to_string())
    }

    #[test]
    fn checksum_is_sha256_of_concatenation() {
        let expected = hex::encode(Sha256::digest(b"api_keyrequest_tokensecret"));
        assert_eq!(session_checksum(&creds(), "request_token"), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn checksum_depends_on_request_token() {
        assert_ne!(
            session_checksum(&creds(), "a"),
            session_checksum(&creds(), "b")
        );
    }

    #[test]
    fn login_url_carries_version_and_key() {
        assert_eq!(
            login_url("https://kite.zerodha.com/connect/login", "abc123"),
            "https://kite.zerodha.com/connect/login?v=3&api_key=abc123"
        );
    }

    #[test]
    fn authorization_header_format() {
        assert_eq!(authorization_header("k", "t"), "token k:t");
    }
}
