//! Route handlers for the frontend API.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::AppState;
use crate::application::services::{AuthStatus, DashboardData, GatewayError, StreamStatus};
use crate::domain::portfolio::{Holding, Position, Profile};
use crate::domain::session::TokenInfo;
use crate::domain::ticker::InstrumentToken;

const TOKEN_INFO_HELP: &str = "If is_valid=false, you need to login again at /kite-login";

/// `{"status": "success", "data": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Always `"success"`.
    pub status: &'static str,
    /// Payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    const fn success(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
        })
    }
}

/// Response of `/api/ltp/{instrument_token}`.
#[derive(Debug, Clone, Serialize)]
pub struct LtpResponse {
    /// Requested instrument.
    pub instrument_token: InstrumentToken,
    /// Live price, `null` when none has been seen.
    pub last_price: Option<f64>,
}

/// Response of `/debug/token-info`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfoResponse {
    /// Always `"success"`.
    pub status: &'static str,
    /// Stored token details.
    pub token_info: TokenInfo,
    /// Hint for the operator.
    pub help: &'static str,
}

/// Query of the broker's login redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// One-time token to exchange.
    pub request_token: Option<String>,
    /// `"success"` when the user signed in.
    pub status: Option<String>,
}

pub(super) async fn root() -> Json<Value> {
    Json(json!({
        "status": "running",
        "message": "Kite Connect gateway (single user)",
        "endpoints": {
            "status": "/auth/status",
            "login": "/kite-login",
            "callback": "/auth/callback",
            "profile": "/api/profile",
            "holdings": "/api/holdings",
            "positions": "/api/positions",
            "dashboard": "/api/dashboard-data",
            "ltp": "/api/ltp/{instrument_token}",
            "ticker": "/api/ticker/status",
            "token_info": "/debug/token-info",
            "health": "/health",
            "metrics": "/metrics",
        }
    }))
}

pub(super) async fn auth_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AuthStatus>, GatewayError> {
    Ok(Json(state.gateway.auth_status().await?))
}

pub(super) async fn kite_login(State(state): State<Arc<AppState>>) -> Redirect {
    let url = state.gateway.login_url();
    tracing::info!(url = %url, "Redirecting to broker login");
    Redirect::temporary(&url)
}

pub(super) async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let status = params.status.as_deref().unwrap_or("success");
    tracing::info!(status, "Login callback");

    let outcome: &[(&str, &str)] = if status != "success" {
        tracing::warn!(status, "Broker login was not completed");
        &[("auth", "failed")]
    } else if let Some(request_token) = params.request_token.as_deref() {
        match state.gateway.complete_login(request_token).await {
            Ok(instruments) => {
                tracing::info!(instruments, "Login completed");
                &[("auth", "success")]
            }
            Err(error) => {
                tracing::error!(error = %error, "Login failed");
                return Redirect::temporary(&frontend_redirect(
                    &state.frontend_url,
                    &[("auth", "error"), ("message", &error.to_string())],
                ));
            }
        }
    } else {
        &[("auth", "error"), ("message", "missing request_token")]
    };

    Redirect::temporary(&frontend_redirect(&state.frontend_url, outcome))
}

pub(super) async fn profile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Profile>>, GatewayError> {
    Ok(ApiResponse::success(state.gateway.profile().await?))
}

pub(super) async fn holdings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Holding>>>, GatewayError> {
    Ok(ApiResponse::success(state.gateway.holdings().await?))
}

pub(super) async fn positions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Position>>>, GatewayError> {
    Ok(ApiResponse::success(state.gateway.positions().await?))
}

pub(super) async fn dashboard_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<DashboardData>>, GatewayError> {
    Ok(ApiResponse::success(state.gateway.dashboard().await?))
}

pub(super) async fn ltp(
    State(state): State<Arc<AppState>>,
    Path(instrument_token): Path<InstrumentToken>,
) -> Json<LtpResponse> {
    Json(LtpResponse {
        instrument_token,
        last_price: state.gateway.ltp(instrument_token),
    })
}

pub(super) async fn ticker_status(State(state): State<Arc<AppState>>) -> Json<StreamStatus> {
    Json(state.gateway.ticker_status())
}

pub(super) async fn token_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TokenInfoResponse>, GatewayError> {
    Ok(Json(TokenInfoResponse {
        status: "success",
        token_info: state.gateway.token_info()?,
        help: TOKEN_INFO_HELP,
    }))
}

/// Frontend URL with `pairs` appended to its query.
fn frontend_redirect(frontend: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse_with_params(frontend, pairs) {
        Ok(url) => url.into(),
        Err(_) => {
            let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{frontend}?{}", query.join("&"))
        }
    }
}
