//! Kite REST client against a mock Kite Connect API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use kite_gateway::GatewayConfig;
use kite_gateway::application::ports::{BrokerError, BrokerPort};
use kite_gateway::infrastructure::config::Credentials;
use kite_gateway::infrastructure::kite::KiteClient;
use kite_gateway::infrastructure::kite::auth::session_checksum;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-key";
const API_SECRET: &str = "test-secret";

fn client(server: &MockServer) -> KiteClient {
    let api_url = server.uri();
    let config = GatewayConfig::from_lookup(|key| match key {
        "API_KEY" => Some(API_KEY.to_string()),
        "SECRET_KEY" => Some(API_SECRET.to_string()),
        "KITE_API_URL" => Some(api_url.clone()),
        _ => None,
    })
    .unwrap();
    KiteClient::new(&config).unwrap()
}

fn success(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": data}))
}

#[tokio::test]
async fn generate_session_posts_checksum() {
    let server = MockServer::start().await;
    let checksum = session_checksum(
        &Credentials::new(API_KEY.to_string(), API_SECRET.to_string()),
        "req-123",
    );
    Mock::given(method("POST"))
        .and(path("/session/token"))
        .and(header("X-Kite-Version", "3"))
        .and(body_string_contains("api_key=test-key"))
        .and(body_string_contains("request_token=req-123"))
        .and(body_string_contains(format!("checksum={checksum}")))
        .respond_with(success(json!({"access_token": "fresh-access", "user_id": "AB1234"})))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server).generate_session("req-123").await.unwrap();
    assert_eq!(token, "fresh-access");
}

#[tokio::test]
async fn rejected_request_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "status": "error",
            "message": "Token is invalid or has expired.",
            "error_type": "TokenException",
        })))
        .mount(&server)
        .await;

    let error = client(&server).generate_session("stale").await.unwrap_err();
    assert_eq!(
        error,
        BrokerError::TokenRejected("Token is invalid or has expired.".to_string())
    );
}

#[tokio::test]
async fn profile_sends_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .and(header("Authorization", "token test-key:access"))
        .and(header("X-Kite-Version", "3"))
        .respond_with(success(json!({
            "user_id": "AB1234",
            "user_name": "Test User",
            "email": "test@example.com",
            "exchanges": ["NSE", "BSE"],
        })))
        .mount(&server)
        .await;

    let profile = client(&server).profile("access").await.unwrap();
    assert_eq!(profile.user_id, "AB1234");
    assert_eq!(profile.extra["exchanges"], json!(["NSE", "BSE"]));
}

#[tokio::test]
async fn holdings_and_positions_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/portfolio/holdings"))
        .respond_with(success(json!([{
            "tradingsymbol": "INFY",
            "exchange": "NSE",
            "instrument_token": 408_065,
            "quantity": 10,
            "average_price": 1400.0,
            "last_price": 1500.0,
            "pnl": 1000.0,
            "t1_quantity": 0,
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/portfolio/positions"))
        .respond_with(success(json!({
            "net": [{"tradingsymbol": "NIFTY26MARFUT", "instrument_token": 9001, "quantity": 50, "pnl": -75.25}],
            "day": [],
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let holdings = client.holdings("access").await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].instrument_token, 408_065);
    assert_eq!(holdings[0].extra["t1_quantity"], 0);

    let positions = client.positions("access").await.unwrap();
    assert_eq!(positions.net[0].pnl, -75.25);
    assert!(positions.day.is_empty());
}

#[tokio::test]
async fn expired_access_token_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/portfolio/holdings"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "status": "error",
            "message": "Incorrect `api_key` or `access_token`.",
            "error_type": "TokenException",
        })))
        .mount(&server)
        .await;

    assert!(matches!(
        client(&server).holdings("expired").await,
        Err(BrokerError::TokenRejected(_))
    ));
}

#[tokio::test]
async fn server_error_keeps_details() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "status": "error",
            "message": "Service unavailable",
            "error_type": "NetworkException",
        })))
        .mount(&server)
        .await;

    assert_eq!(
        client(&server).profile("access").await.unwrap_err(),
        BrokerError::Api {
            status: 503,
            error_type: "NetworkException".to_string(),
            message: "Service unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        client(&server).profile("access").await,
        Err(BrokerError::Decode(_))
    ));
}

#[tokio::test]
async fn unreachable_api_is_network_error() {
    let server = MockServer::start().await;
    let client = client(&server);
    drop(server);

    assert!(matches!(
        client.profile("access").await,
        Err(BrokerError::Network(_))
    ));
}

#[test]
fn login_url_uses_api_key() {
    let config = GatewayConfig::from_lookup(|key| match key {
        "API_KEY" => Some(API_KEY.to_string()),
        "SECRET_KEY" => Some(API_SECRET.to_string()),
        _ => None,
    })
    .unwrap();
    let client = KiteClient::new(&config).unwrap();
    assert_eq!(
        client.login_url(),
        "https://kite.zerodha.com/connect/login?v=3&api_key=test-key"
    );
    assert_eq!(client.api_key(), "test-key");
}
