/// WebSocket connection handler
///
/// One task per connection drives a select loop over:
/// - frames queued for this user by the bus consumer
/// - the user's listener queue
/// - frames from the client (commands and heartbeats)
/// - the heartbeat ticker and a once-per-second staleness check
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::command::error_frame;
use super::handlers::{handle_text, ConnectionContext};
use super::state::AppState;
use crate::errors::GatewayError;
use crate::logger::{self, LogTag};
use crate::session::{is_heartbeat, HeartbeatConfig, ListenerEvent, Liveness, HEARTBEAT_FRAME};

const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

type WsSender = SplitSink<WebSocket, Message>;

pub async fn handle_connection(socket: WebSocket, state: Arc<AppState>, token: String) {
    let conn_id = state.sessions.next_connection_id();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.config.session.outbound_buffer.max(1));
    let mut ctx = ConnectionContext::new(conn_id, token, outbound_tx);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let heartbeat = HeartbeatConfig::from(&state.config.session);
    let mut liveness = Liveness::new(heartbeat);
    let mut heartbeat_ticker = tokio::time::interval(heartbeat.interval);
    let mut liveness_check = tokio::time::interval(LIVENESS_CHECK_INTERVAL);

    logger::debug(LogTag::Gateway, &format!("Connection {} started", conn_id));

    loop {
        tokio::select! {
            // Frames pushed through the session registry
            Some(frame) = outbound_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                    logger::warning(
                        LogTag::Gateway,
                        &format!("Connection {}: failed to send frame: {}", conn_id, e),
                    );
                    break;
                }
            }

            Some(event) = next_listener_event(&mut ctx.listener) => {
                logger::info(
                    LogTag::Session,
                    &format!("{} received a message from {}: {}", event.to, event.from, event.content),
                );
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        liveness.record_frame();
                        if is_heartbeat(&text) {
                            continue;
                        }
                        let reply = handle_text(&state, &mut ctx, &text).await;
                        if send_text(&mut ws_tx, reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        liveness.record_frame();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        logger::debug(
                            LogTag::Gateway,
                            &format!("Connection {}: client closed", conn_id),
                        );
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        liveness.record_frame();
                        let reply = error_frame(&GatewayError::invalid("binary frames are not supported"));
                        if send_text(&mut ws_tx, reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        logger::warning(
                            LogTag::Gateway,
                            &format!("Connection {}: websocket error: {}", conn_id, e),
                        );
                        break;
                    }
                }
            }

            _ = heartbeat_ticker.tick() => {
                if send_text(&mut ws_tx, HEARTBEAT_FRAME.to_string()).await.is_err() {
                    break;
                }
                liveness.record_heartbeat_sent();
            }

            _ = liveness_check.tick() => {
                if liveness.is_stale() {
                    logger::warning(
                        LogTag::Gateway,
                        &format!(
                            "Connection {}: no frame for {}s, closing",
                            conn_id,
                            liveness.silent_for().as_secs()
                        ),
                    );
                    break;
                }
            }
        }
    }

    if let Some(username) = ctx.username.take() {
        state.sessions.logout(&username, conn_id);
    }
    logger::debug(LogTag::Gateway, &format!("Connection {} closed", conn_id));
}

async fn send_text(ws_tx: &mut WsSender, text: String) -> Result<(), axum::Error> {
    ws_tx.send(Message::Text(text)).await
}

/// Pending forever when no listener is registered, so the select arm idles
async fn next_listener_event(
    listener: &mut Option<mpsc::Receiver<ListenerEvent>>,
) -> Option<ListenerEvent> {
    match listener {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
