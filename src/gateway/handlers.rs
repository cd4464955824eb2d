/// Per-connection command dispatch
///
/// Each parsed command is routed to the owning backend service; the returned
/// string is the reply frame written back to the client.
use tokio::sync::mpsc;

use super::command::{error_frame, ok_frame, welcome_frame, ClientCommand};
use super::state::AppState;
use crate::bus::Event;
use crate::errors::{GatewayError, GatewayResult};
use crate::idempotency::Operation;
use crate::logger::{self, LogTag};
use crate::session::{ConnectionId, ListenerEvent, SessionHandle};

/// What one WebSocket connection knows about itself
pub struct ConnectionContext {
    pub conn_id: ConnectionId,
    /// Authorization header value, forwarded to backends verbatim
    pub token: String,
    /// Queue drained by the connection task; registered on login
    pub outbound: mpsc::Sender<String>,
    pub username: Option<String>,
    pub listener: Option<mpsc::Receiver<ListenerEvent>>,
}

impl ConnectionContext {
    pub fn new(conn_id: ConnectionId, token: String, outbound: mpsc::Sender<String>) -> Self {
        Self {
            conn_id,
            token,
            outbound,
            username: None,
            listener: None,
        }
    }
}

/// Parse and run one client frame, returning the reply frame
pub async fn handle_text(state: &AppState, ctx: &mut ConnectionContext, text: &str) -> String {
    let command = match ClientCommand::parse(text) {
        Ok(command) => command,
        Err(e) => {
            logger::debug(
                LogTag::Gateway,
                &format!("Connection {}: rejected frame: {}", ctx.conn_id, e),
            );
            return error_frame(&e);
        }
    };

    let name = command.name();
    match dispatch(state, ctx, command).await {
        Ok(frame) => frame,
        Err(e) => {
            let message = format!("Connection {}: {} failed: {}", ctx.conn_id, name, e);
            if e.is_fatal() {
                logger::error(LogTag::Gateway, &message);
            } else if e.is_policy() {
                // Rejections are client outcomes, not gateway faults
                logger::debug(LogTag::Gateway, &message);
            } else {
                logger::warning(LogTag::Gateway, &message);
            }
            error_frame(&e)
        }
    }
}

pub async fn dispatch(
    state: &AppState,
    ctx: &mut ConnectionContext,
    command: ClientCommand,
) -> GatewayResult<String> {
    match command {
        ClientCommand::Register {
            username,
            password,
            nickname,
        } => {
            if !state
                .idempotency
                .first_attempt(&username, Operation::Register)
                .await?
            {
                return Ok(ok_frame("register", "already processed"));
            }
            let reply = state
                .backends
                .register(&ctx.token, &username, &password, &nickname)
                .await?;
            if !reply.success {
                return Err(GatewayError::invalid(reply.message));
            }
            logger::info(LogTag::Gateway, &format!("Registered {}", username));
            Ok(ok_frame("register", &username))
        }

        ClientCommand::Login { username, password } => {
            let reply = state.backends.login(&ctx.token, &username, &password).await?;
            if !reply.success {
                return Err(GatewayError::Unauthorized(reply.message));
            }

            if let Some(previous) = ctx.username.take() {
                if previous != username {
                    state.sessions.logout(&previous, ctx.conn_id);
                }
            }
            state.sessions.login(
                &username,
                SessionHandle::new(ctx.conn_id, ctx.outbound.clone()),
            );
            ctx.listener = Some(state.sessions.register_listener(&username));
            ctx.username = Some(username.clone());
            Ok(welcome_frame(&username))
        }

        ClientCommand::SendMessage { from, to, content } => {
            if ctx.username.as_deref() != Some(from.as_str()) {
                return Err(GatewayError::Unauthorized(format!(
                    "log in as {} before sending",
                    from
                )));
            }
            let reply = state
                .backends
                .send_message(&ctx.token, &from, &to, &content)
                .await?;
            if !reply.success {
                return Err(GatewayError::invalid(reply.message));
            }

            // The message is stored; a failed notification must not fail the send
            let event = Event::new_message(&from, &to, &content);
            if let Err(e) = state.publisher.publish(&event).await {
                logger::error(
                    LogTag::Bus,
                    &format!("Failed to publish {}: {}", event, e),
                );
            }
            Ok(ok_frame("sendMessage", &to))
        }

        ClientCommand::GetFriendList { username } => {
            let friends = state.backends.get_friend_list(&ctx.token, &username).await?;
            Ok(ok_frame("getFriendList", &friends.join(",")))
        }
    }
}
