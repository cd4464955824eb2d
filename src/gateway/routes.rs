use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use super::connection::handle_connection;
use super::middleware::rate_limit;
use super::state::AppState;
use crate::balancer::LoadReport;
use crate::errors::GatewayError;
use crate::logger::{self, LogTag};

pub fn build_router(state: Arc<AppState>) -> Router {
    let limited = Router::new()
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(limited)
        .route("/report_load", post(report_load))
        .route("/health", get(health))
        .with_state(state)
}

/// JSON error body shared by every route
pub fn error_response(status: StatusCode, error: &GatewayError) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": error.code(),
                "message": error.to_string(),
            }
        })),
    )
        .into_response()
}

/// WebSocket upgrade; requires an Authorization header unless disabled
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let token = headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    if token.is_empty() && state.config.server.require_auth {
        logger::debug(LogTag::Gateway, "Rejected upgrade without Authorization header");
        return error_response(
            StatusCode::UNAUTHORIZED,
            &GatewayError::Unauthorized("missing Authorization header".to_string()),
        );
    }

    let Some(ws) = ws else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &GatewayError::invalid("expected a WebSocket upgrade request"),
        );
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, token))
}

/// `POST /report_load` with `{"endpoint": string, "load": int}`
async fn report_load(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let report: LoadReport = match serde_json::from_slice(&body) {
        Ok(report) => report,
        Err(e) => {
            logger::debug(LogTag::Balancer, &format!("Bad load report: {}", e));
            return error_response(
                StatusCode::BAD_REQUEST,
                &GatewayError::invalid("invalid request"),
            );
        }
    };
    if report.endpoint.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &GatewayError::invalid("endpoint cannot be empty"),
        );
    }

    state.monitor.report_load(&report.endpoint, report.load);
    StatusCode::OK.into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "uptime_seconds": state.uptime_seconds(),
        "active_sessions": state.sessions.active_sessions(),
        "loads": state.monitor.snapshot(),
        "breakers": state.breakers.all_status(),
        "bus": state.publisher.backend_name(),
    }))
    .into_response()
}
