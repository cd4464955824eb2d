/// Client side of a gateway connection
///
/// Runs a heartbeat sender and a receive loop as separate tasks over one
/// transport. When the receive loop ends or no frame arrived within the
/// heartbeat timeout, both tasks are torn down and the bounded reconnect
/// policy dials a fresh transport; on success both tasks start again.
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use super::heartbeat::{is_heartbeat, HeartbeatConfig, Liveness, HEARTBEAT_FRAME};
use super::reconnect::{reconnect, Dialer, FrameSink, FrameSource, ReconnectPolicy, Transport};
use crate::errors::GatewayResult;
use crate::logger::{self, LogTag};

const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    Shutdown,
    Stale,
    Closed,
}

pub struct ClientSession {
    dialer: Arc<dyn Dialer>,
    policy: ReconnectPolicy,
    heartbeat: HeartbeatConfig,
    /// Commands typed by the user, sent ahead of the next heartbeat
    outbound: Arc<AsyncMutex<mpsc::Receiver<String>>>,
    /// Non-heartbeat frames received from the gateway
    inbound: mpsc::Sender<String>,
}

impl ClientSession {
    pub fn new(
        dialer: Arc<dyn Dialer>,
        policy: ReconnectPolicy,
        heartbeat: HeartbeatConfig,
        outbound: mpsc::Receiver<String>,
        inbound: mpsc::Sender<String>,
    ) -> Self {
        Self {
            dialer,
            policy,
            heartbeat,
            outbound: Arc::new(AsyncMutex::new(outbound)),
            inbound,
        }
    }

    /// Connect and keep the connection alive until shutdown
    ///
    /// Returns an error when the first dial fails or reconnection is exhausted.
    pub async fn run(self, shutdown: Arc<Notify>) -> GatewayResult<()> {
        let mut transport = self.dialer.dial(&self.policy.target).await?;
        logger::info(LogTag::Session, &format!("Connected to {}", self.policy.target));

        loop {
            match self.drive(transport, &shutdown).await {
                ConnectionEnd::Shutdown => return Ok(()),
                end => {
                    logger::warning(
                        LogTag::Session,
                        &format!(
                            "Connection {}, reconnecting",
                            if end == ConnectionEnd::Stale { "stale" } else { "closed" }
                        ),
                    );
                    transport = reconnect(&self.policy, self.dialer.as_ref()).await?;
                }
            }
        }
    }

    async fn drive(&self, transport: Transport, shutdown: &Notify) -> ConnectionEnd {
        let liveness = Arc::new(Mutex::new(Liveness::new(self.heartbeat)));

        let sender = spawn_heartbeat_sender(
            transport.sink,
            liveness.clone(),
            self.outbound.clone(),
            self.heartbeat.interval,
        );
        let receiver = spawn_receive_loop(transport.source, liveness.clone(), self.inbound.clone());

        let mut check = tokio::time::interval(LIVENESS_CHECK_INTERVAL);
        let stop = shutdown.notified();
        tokio::pin!(stop);
        let end = loop {
            tokio::select! {
                _ = &mut stop => break ConnectionEnd::Shutdown,
                _ = check.tick() => {
                    if receiver.is_finished() {
                        break ConnectionEnd::Closed;
                    }
                    let liveness = liveness.lock();
                    if liveness.is_stale() {
                        logger::warning(
                            LogTag::Session,
                            &format!("No frame for {}s", liveness.silent_for().as_secs()),
                        );
                        break ConnectionEnd::Stale;
                    }
                }
            }
        };

        // Dropping the halves closes the old transport
        sender.abort();
        receiver.abort();
        end
    }
}

fn spawn_heartbeat_sender(
    mut sink: Box<dyn FrameSink>,
    liveness: Arc<Mutex<Liveness>>,
    outbound: Arc<AsyncMutex<mpsc::Receiver<String>>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut outbound = outbound.lock().await;
        let mut outbound_open = true;
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sink.send_text(HEARTBEAT_FRAME.to_string()).await {
                        logger::warning(LogTag::Session, &format!("Heartbeat send failed: {}", e));
                        break;
                    }
                    liveness.lock().record_heartbeat_sent();
                }
                command = outbound.recv(), if outbound_open => match command {
                    Some(text) => {
                        if let Err(e) = sink.send_text(text).await {
                            logger::warning(LogTag::Session, &format!("Send failed: {}", e));
                            break;
                        }
                    }
                    None => outbound_open = false,
                },
            }
        }
    })
}

fn spawn_receive_loop(
    mut source: Box<dyn FrameSource>,
    liveness: Arc<Mutex<Liveness>>,
    inbound: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = source.next_text().await {
            match frame {
                Ok(text) => {
                    liveness.lock().record_frame();
                    if is_heartbeat(&text) {
                        continue;
                    }
                    if inbound.send(text).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    logger::warning(LogTag::Session, &format!("Receive failed: {}", e));
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::reconnect::testing::FakeDialer;
    use std::sync::atomic::Ordering;

    fn session(dialer: Arc<FakeDialer>) -> (ClientSession, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (in_tx, in_rx) = mpsc::channel(8);
        let session = ClientSession::new(
            dialer,
            ReconnectPolicy::default(),
            HeartbeatConfig::default(),
            out_rx,
            in_tx,
        );
        (session, out_tx, in_rx)
    }

    async fn wait_for_dials(dialer: &FakeDialer, count: u32) {
        for _ in 0..600 {
            if dialer.dials.load(Ordering::SeqCst) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("expected {} dials", count);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_triggers_reconnect() {
        let dialer = FakeDialer::new(0);
        let (session, _out_tx, _in_rx) = session(dialer.clone());
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(session.run(shutdown.clone()));

        wait_for_dials(&dialer, 1).await;
        let started = tokio::time::Instant::now();
        wait_for_dials(&dialer, 2).await;
        assert!(started.elapsed() >= Duration::from_secs(60));

        // The first connection carried heartbeats before going stale
        let mut peers = dialer.peers.lock().await;
        let first = &mut peers[0];
        assert_eq!(first.from_client.recv().await.unwrap(), HEARTBEAT_FRAME);
        drop(peers);

        shutdown.notify_waiters();
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_forwarded_and_commands_sent() {
        let dialer = FakeDialer::new(0);
        let (session, out_tx, mut in_rx) = session(dialer.clone());
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(session.run(shutdown.clone()));
        wait_for_dials(&dialer, 1).await;

        {
            let mut peers = dialer.peers.lock().await;
            let peer = &mut peers[0];
            peer.to_client.send(HEARTBEAT_FRAME.to_string()).unwrap();
            peer.to_client.send("welcome".to_string()).unwrap();
        }
        assert_eq!(in_rx.recv().await.unwrap(), "welcome");

        out_tx.send("login|alice|pw".to_string()).await.unwrap();
        let mut peers = dialer.peers.lock().await;
        let peer = &mut peers[0];
        let mut sent_login = false;
        for _ in 0..5 {
            if peer.from_client.recv().await.unwrap() == "login|alice|pw" {
                sent_login = true;
                break;
            }
        }
        assert!(sent_login);
        drop(peers);

        shutdown.notify_waiters();
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnect_ends_the_session_with_error() {
        let dialer = FakeDialer::new(0);
        let (session, _out_tx, _in_rx) = session(dialer.clone());
        let task = tokio::spawn(session.run(Arc::new(Notify::new())));
        wait_for_dials(&dialer, 1).await;

        // Every redial fails from now on
        dialer.failures.store(100, Ordering::SeqCst);
        // Closing the server side ends the receive loop
        dialer.peers.lock().await.clear();

        let result = task.await.unwrap();
        assert!(result.is_err());
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 4);
    }
}
