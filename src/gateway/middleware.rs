/// Gateway middleware
///
/// Rate limiting in front of the WebSocket upgrade.
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::routes::error_response;
use super::state::AppState;
use crate::errors::GatewayError;
use crate::logger::{self, LogTag};

/// Token-bucket gate; 429 on deny, 500 when the limiter itself failed
///
/// The check runs through the `rate_limit_allow` breaker, whose fallback
/// denies.
pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(limiter) = state.limiter.as_ref() else {
        return next.run(request).await;
    };

    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let key = limiter.key_for(client_ip.as_deref());

    match limiter.allow_protected(&state.breakers, &key).await {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            logger::debug(LogTag::Limiter, &format!("Denied request for {}", key));
            error_response(
                StatusCode::TOO_MANY_REQUESTS,
                &GatewayError::Denied { scope: key },
            )
        }
        Err(e) => {
            logger::error(LogTag::Limiter, &format!("Rate limit check failed: {}", e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}
