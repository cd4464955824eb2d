//! Transport abstraction and bounded reconnect
//!
//! A dialed connection is split into a frame sink and a frame source so the
//! heartbeat sender and the receive loop can run as separate tasks.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::SessionConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> GatewayResult<()>;
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame; `None` once the peer closed the connection
    async fn next_text(&mut self) -> Option<GatewayResult<String>>;
}

pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &str) -> GatewayResult<Transport>;
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub target: String,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
            target: "ws://localhost:8080/ws".to_string(),
        }
    }
}

impl From<&SessionConfig> for ReconnectPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts,
            delay: Duration::from_secs(config.reconnect_delay_secs),
            target: config.reconnect_target.clone(),
        }
    }
}

/// Dial `policy.target` up to `policy.attempts` times, `policy.delay` apart
///
/// The caller has already dropped the old transport. Exhausting the attempts
/// is terminal for this connection.
pub async fn reconnect(policy: &ReconnectPolicy, dialer: &dyn Dialer) -> GatewayResult<Transport> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match dialer.dial(&policy.target).await {
            Ok(transport) => {
                logger::info(
                    LogTag::Session,
                    &format!("Reconnected to {} (attempt {}/{})", policy.target, attempt, attempts),
                );
                return Ok(transport);
            }
            Err(e) => {
                logger::warning(
                    LogTag::Session,
                    &format!(
                        "Reconnect attempt {}/{} to {} failed: {}",
                        attempt, attempts, policy.target, e
                    ),
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());
    logger::error(
        LogTag::Session,
        &format!(
            "Giving up on {} after {} attempts: {}",
            policy.target, attempts, reason
        ),
    );
    Err(GatewayError::unavailable("websocket", reason))
}

// ============================================================================
// WEBSOCKET TRANSPORT
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsSink(SplitSink<WsStream, Message>);
struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> GatewayResult<()> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::unavailable("websocket", e))
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_text(&mut self) -> Option<GatewayResult<String>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Ok(_) => continue,
                Err(e) => return Some(Err(GatewayError::unavailable("websocket", e))),
            }
        }
    }
}

/// Dials the gateway with tokio-tungstenite, sending the Authorization header
pub struct WsDialer {
    token: Option<String>,
}

impl WsDialer {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, target: &str) -> GatewayResult<Transport> {
        let mut request = target
            .into_client_request()
            .map_err(|e| GatewayError::invalid(format!("bad target '{}': {}", target, e)))?;

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(token)
                .map_err(|_| GatewayError::invalid("token is not a valid header value"))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| GatewayError::unavailable("websocket", e))?;
        let (sink, source) = stream.split();

        Ok(Transport {
            sink: Box::new(WsSink(sink)),
            source: Box::new(WsSource(source)),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    pub struct ChannelSink(pub mpsc::UnboundedSender<String>);
    pub struct ChannelSource(pub mpsc::UnboundedReceiver<String>);

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send_text(&mut self, text: String) -> GatewayResult<()> {
            self.0
                .send(text)
                .map_err(|_| GatewayError::unavailable("websocket", "peer gone"))
        }
    }

    #[async_trait]
    impl FrameSource for ChannelSource {
        async fn next_text(&mut self) -> Option<GatewayResult<String>> {
            self.0.recv().await.map(Ok)
        }
    }

    /// Server side of one fake connection
    pub struct FakePeer {
        pub from_client: mpsc::UnboundedReceiver<String>,
        pub to_client: mpsc::UnboundedSender<String>,
    }

    /// Fails the first `failures` dials, then hands out channel transports
    pub struct FakeDialer {
        pub failures: AtomicU32,
        pub dials: AtomicU32,
        pub peers: Mutex<Vec<FakePeer>>,
    }

    impl FakeDialer {
        pub fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                dials: AtomicU32::new(0),
                peers: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Dialer for FakeDialer {
        async fn dial(&self, _target: &str) -> GatewayResult<Transport> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(GatewayError::unavailable("websocket", "connection refused"));
            }
            let (client_tx, from_client) = mpsc::unbounded_channel();
            let (to_client, client_rx) = mpsc::unbounded_channel();
            self.peers.lock().await.push(FakePeer {
                from_client,
                to_client,
            });
            Ok(Transport {
                sink: Box::new(ChannelSink(client_tx)),
                source: Box::new(ChannelSource(client_rx)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeDialer;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_a_later_attempt() {
        let dialer = FakeDialer::new(2);
        let started = tokio::time::Instant::now();

        let result = reconnect(&ReconnectPolicy::default(), dialer.as_ref()).await;
        assert!(result.is_ok());
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 3);
        // Two failed attempts, each followed by the fixed delay
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let dialer = FakeDialer::new(10);
        let result = reconnect(&ReconnectPolicy::default(), dialer.as_ref()).await;
        assert!(matches!(result, Err(GatewayError::Unavailable { .. })));
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 3);
    }
}
