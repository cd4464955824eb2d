/// Gateway server lifecycle
///
/// Binds the configured address and serves the router until the shutdown
/// notifier fires.
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::routes::build_router;
use super::state::AppState;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

/// Blocks until the server is shut down
pub async fn start_server(state: Arc<AppState>, shutdown: Arc<Notify>) -> GatewayResult<()> {
    let listener = bind(&state.config.server.bind_address()).await?;
    serve(listener, state, shutdown).await
}

/// Bind the gateway address; every failure is fatal to startup
pub async fn bind(address: &str) -> GatewayResult<TcpListener> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| GatewayError::invalid(format!("Invalid bind address {}: {}", address, e)))?;

    TcpListener::bind(&addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::AddrInUse => GatewayError::Fatal(format!(
            "Failed to bind to {}: address already in use (is another gateway running?)",
            addr
        )),
        std::io::ErrorKind::PermissionDenied => GatewayError::Fatal(format!(
            "Failed to bind to {}: permission denied; use a port above 1024",
            addr
        )),
        _ => GatewayError::Fatal(format!("Failed to bind to {}: {}", addr, e)),
    })
}

/// Serve on an already bound listener
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
) -> GatewayResult<()> {
    let local = listener.local_addr()?;
    logger::info(LogTag::Gateway, &format!("Gateway listening on {}", local));

    let app = build_router(state);
    let shutdown_signal = async move {
        shutdown.notified().await;
        logger::info(LogTag::Gateway, "Received shutdown signal, stopping gateway...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .map_err(|e| GatewayError::Fatal(format!("Server error: {}", e)))?;

    logger::info(LogTag::Gateway, "Gateway stopped");
    Ok(())
}
