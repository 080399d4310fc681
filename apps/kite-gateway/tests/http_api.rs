//! HTTP API against a fake broker, an in-memory token store and a scripted
//! ticker.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

mod support;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use kite_gateway::application::ports::TokenRepository;
use kite_gateway::infrastructure::http::{AppState, router};
use kite_gateway::infrastructure::persistence::SqliteTokenStore;
use kite_gateway::{GatewayService, RunState, StreamManager, Tick, TickerEvent};
use serde_json::Value;
use support::{
    ACCESS_TOKEN, FakeBroker, GOOD_REQUEST_TOKEN, ScriptedSession, ScriptedTransport, eventually,
    holding, next_session,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

const FRONTEND: &str = "https://frontend.example/app/";

struct Harness {
    app: Router,
    broker: Arc<FakeBroker>,
    store: Arc<SqliteTokenStore>,
    stream: Arc<StreamManager>,
    sessions: UnboundedReceiver<ScriptedSession>,
}

fn harness() -> Harness {
    let (transport, sessions) = ScriptedTransport::new();
    let broker = FakeBroker::new(vec![
        holding("INFY", 408_065, 10, 1400.0, 1500.0),
        holding("TCS", 2_953_217, 2, 3500.0, 3600.0),
    ]);
    let store = Arc::new(SqliteTokenStore::open_in_memory().unwrap());
    let stream = Arc::new(StreamManager::new(transport));
    let gateway = Arc::new(GatewayService::new(
        broker.clone(),
        store.clone(),
        Arc::clone(&stream),
    ));
    let app = router(Arc::new(AppState::new(gateway, FRONTEND)));
    Harness {
        app,
        broker,
        store,
        stream,
        sessions,
    }
}

impl Harness {
    fn login(&self) {
        self.store.save(ACCESS_TOKEN, chrono::Utc::now()).unwrap();
    }

    async fn get(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.get(uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Complete the broker login and return the ticker session it started.
    async fn login_and_stream(&mut self) -> ScriptedSession {
        let location = self
            .redirect(&format!(
                "/auth/callback?request_token={GOOD_REQUEST_TOKEN}&status=success"
            ))
            .await;
        assert!(location.ends_with("auth=success"), "{location}");
        next_session(&mut self.sessions).await
    }

    async fn redirect(&self, uri: &str) -> String {
        let (status, headers, _) = self.get(uri).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        headers[header::LOCATION].to_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn root_lists_endpoints() {
    let h = harness();
    let (status, body) = h.get_json("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["endpoints"]["login"], "/kite-login");
}

#[tokio::test]
async fn api_requires_login() {
    let h = harness();
    for uri in ["/api/profile", "/api/holdings", "/api/positions", "/api/dashboard-data"] {
        let (status, body) = h.get_json(uri).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["detail"], "Not authenticated. Please login at /kite-login");
    }
}

#[tokio::test]
async fn auth_status_without_token() {
    let h = harness();
    let (status, body) = h.get_json("/auth/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["message"], "No valid token found. Please login.");
    assert!(body.get("user").is_none());
}

#[tokio::test]
async fn kite_login_redirects_to_broker() {
    let h = harness();
    assert_eq!(
        h.redirect("/kite-login").await,
        "https://kite.example/connect/login?v=3&api_key=test-key"
    );
}

#[tokio::test]
async fn callback_with_failed_status() {
    let h = harness();
    let location = h.redirect("/auth/callback?request_token=x&status=cancelled").await;
    assert_eq!(location, format!("{FRONTEND}?auth=failed"));
    assert!(h.store.latest().unwrap().is_none());
}

#[tokio::test]
async fn callback_with_rejected_token() {
    let h = harness();
    let location = h
        .redirect("/auth/callback?request_token=stale&status=success")
        .await;
    assert!(location.starts_with(&format!("{FRONTEND}?auth=error&message=")));
    assert!(!h.stream.is_running());
}

#[tokio::test]
async fn callback_without_request_token() {
    let h = harness();
    let location = h.redirect("/auth/callback").await;
    assert!(location.contains("auth=error"));
}

#[tokio::test]
async fn login_stores_token_and_streams_holdings() {
    let mut h = harness();
    let location = h
        .redirect(&format!(
            "/auth/callback?request_token={GOOD_REQUEST_TOKEN}&status=success"
        ))
        .await;
    assert_eq!(location, format!("{FRONTEND}?auth=success"));

    let stored = h.store.latest().unwrap().unwrap();
    assert_eq!(stored.access_token, ACCESS_TOKEN);

    let session = next_session(&mut h.sessions).await;
    assert_eq!(session.credentials.access_token(), ACCESS_TOKEN);
    assert_eq!(h.stream.subscriptions(), vec![408_065, 2_953_217]);

    let (_, status) = h.get_json("/auth/status").await;
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["user"]["user_id"], "AB1234");

    let (_, ticker) = h.get_json("/api/ticker/status").await;
    assert_eq!(ticker["running"], true);
    assert_eq!(ticker["subscriptions"], serde_json::json!([408_065, 2_953_217]));
}

#[tokio::test]
async fn portfolio_reads_are_wrapped() {
    let h = harness();
    h.login();

    let (status, profile) = h.get_json("/api/profile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["status"], "success");
    assert_eq!(profile["data"]["user_name"], "Test User");
    assert_eq!(profile["data"]["broker"], "ZERODHA");

    let (_, holdings) = h.get_json("/api/holdings").await;
    assert_eq!(holdings["data"].as_array().unwrap().len(), 2);
    assert_eq!(holdings["data"][0]["isin"], "INE000000000");

    let (_, positions) = h.get_json("/api/positions").await;
    assert_eq!(positions["data"][0]["tradingsymbol"], "NIFTY26MARFUT");
}

#[tokio::test]
async fn dashboard_applies_live_prices() {
    let mut h = harness();
    let session = h.login_and_stream().await;

    let (status, first) = h.get_json("/api/dashboard-data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["summary"]["holdings_count"], 2);
    assert_eq!(first["data"]["summary"]["positions_count"], 1);
    assert_eq!(first["data"]["holdings"][0]["last_price"], 1500.0);

    session.emit(TickerEvent::Connected).await;
    session
        .emit(TickerEvent::Ticks(vec![Tick::ltp(408_065, 1600.0)]))
        .await;
    eventually(|| h.stream.get_price(408_065).is_some()).await;

    let (_, dashboard) = h.get_json("/api/dashboard-data").await;
    let data = &dashboard["data"];
    assert_eq!(data["holdings"][0]["last_price"], 1600.0);
    assert_eq!(data["holdings"][0]["pnl"], 2000.0);
    assert_eq!(data["holdings"][1]["last_price"], 3600.0);
    // 10 * 1600 + 2 * 3600
    assert_eq!(data["summary"]["total_value"], 23_200.0);
    // (2000 + 200) holdings + 1250.5 positions
    assert_eq!(data["summary"]["holdings_pnl"], 2200.0);
    assert_eq!(data["summary"]["total_pnl"], 3450.5);
}

#[tokio::test]
async fn dashboard_follows_holding_changes() {
    let mut h = harness();
    let mut session = h.login_and_stream().await;

    h.broker
        .set_holdings(vec![holding("WIPRO", 969_473, 5, 400.0, 410.0)]);
    let _ = h.get_json("/api/dashboard-data").await;

    assert_eq!(h.stream.subscriptions(), vec![969_473]);
    assert_eq!(
        session.next_command().await,
        kite_gateway::TickerCommand::Subscribe(vec![969_473])
    );
}

#[tokio::test]
async fn dashboard_does_not_start_stream() {
    let mut h = harness();
    h.login();

    let (status, _) = h.get_json("/api/dashboard-data").await;
    assert_eq!(status, StatusCode::OK);

    assert!(!h.stream.is_running());
    assert!(h.sessions.try_recv().is_err());
}

#[tokio::test]
async fn closed_stream_stays_closed_across_dashboard_reads() {
    let mut h = harness();
    let session = h.login_and_stream().await;
    session.emit(TickerEvent::Connected).await;
    session
        .emit(TickerEvent::Ticks(vec![Tick::ltp(408_065, 1600.0)]))
        .await;
    eventually(|| h.stream.get_price(408_065).is_some()).await;

    session
        .emit(TickerEvent::Closed {
            code: 1000,
            reason: "bye".to_string(),
        })
        .await;
    eventually(|| h.stream.state() == RunState::Closed).await;

    let (status, dashboard) = h.get_json("/api/dashboard-data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["data"]["holdings"][0]["last_price"], 1600.0);

    assert_eq!(h.stream.state(), RunState::Closed);
    assert!(!h.stream.is_running());
    assert_eq!(h.stream.get_price(408_065), Some(1600.0));
    assert!(h.sessions.try_recv().is_err());

    let (_, ticker) = h.get_json("/api/ticker/status").await;
    assert_eq!(ticker["running"], false);
    assert_eq!(ticker["state"], "closed");
}

#[tokio::test]
async fn ltp_endpoint() {
    let mut h = harness();
    let (_, unknown) = h.get_json("/api/ltp/408065").await;
    assert_eq!(unknown["instrument_token"], 408_065);
    assert!(unknown["last_price"].is_null());

    let session = h.login_and_stream().await;
    session
        .emit(TickerEvent::Ticks(vec![Tick::ltp(408_065, 1512.25)]))
        .await;
    eventually(|| h.stream.get_price(408_065).is_some()).await;

    let (_, known) = h.get_json("/api/ltp/408065").await;
    assert_eq!(known["last_price"], 1512.25);

    let (status, _, _) = h.get("/api/ltp/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_info_reports_store_contents() {
    let h = harness();
    let (_, empty) = h.get_json("/debug/token-info").await;
    assert_eq!(empty["status"], "success");
    assert_eq!(empty["token_info"]["exists"], false);
    assert_eq!(empty["token_info"]["message"], "No tokens in database");

    h.login();
    let (_, info) = h.get_json("/debug/token-info").await;
    assert_eq!(info["token_info"]["exists"], true);
    assert_eq!(info["token_info"]["is_valid"], true);
    assert_eq!(info["token_info"]["token_preview"], "access-tok...");
    assert!(info["help"].as_str().unwrap().contains("/kite-login"));
}

#[tokio::test]
async fn health_endpoints() {
    let h = harness();

    let (status, _, body) = h.get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, _, body) = h.get("/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"READY");

    let (status, health) = h.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["token_store"], true);
    assert_eq!(health["ticker"]["state"], "stopped");
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/status")
                .header(header::ORIGIN, "https://elsewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
