/// In-memory session registry
///
/// Maps a username to the outbound queue of its live connection, and keeps a
/// separate observer table of per-user listener queues. Both queues are
/// bounded; delivery uses `try_send` so one slow client never blocks the bus
/// consumer or other users.
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::bus::Event;
use crate::logger::{self, LogTag};

/// Unique per accepted WebSocket connection
pub type ConnectionId = u64;

#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub conn_id: ConnectionId,
    sender: mpsc::Sender<String>,
}

impl SessionHandle {
    pub fn new(conn_id: ConnectionId, sender: mpsc::Sender<String>) -> Self {
        Self { conn_id, sender }
    }
}

/// A chat message observed for a user with a registered listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerEvent {
    pub from: String,
    pub to: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    Offline,
    /// Queue full; the frame was dropped
    Dropped,
}

/// Frames written by one `deliver` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub frames: usize,
    pub listeners: usize,
}

pub fn new_message_text(from: &str, content: &str) -> String {
    format!("New message from {}: {}", from, content)
}

pub fn message_sent_text(to: &str, content: &str) -> String {
    format!("Message to {} sent: {}", to, content)
}

pub fn friend_accepted_text_for_requester(to: &str) -> String {
    format!("Your friend request to {} was accepted", to)
}

pub fn friend_accepted_text_for_accepter(from: &str) -> String {
    format!("You accepted the friend request from {}", from)
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    listeners: RwLock<HashMap<String, mpsc::Sender<ListenerEvent>>>,
    next_conn_id: AtomicU64,
    listener_buffer: usize,
}

impl SessionRegistry {
    pub fn new(listener_buffer: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            listener_buffer: listener_buffer.max(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Record `username` on this connection, replacing any previous entry
    ///
    /// Returns the connection id that was replaced, if any.
    pub fn login(&self, username: &str, handle: SessionHandle) -> Option<ConnectionId> {
        let conn_id = handle.conn_id;
        let replaced = self
            .sessions
            .write()
            .insert(username.to_string(), handle)
            .map(|old| old.conn_id);

        match replaced {
            Some(old) if old != conn_id => logger::info(
                LogTag::Session,
                &format!("{} logged in on connection {} (replaces {})", username, conn_id, old),
            ),
            _ => logger::info(
                LogTag::Session,
                &format!("{} logged in on connection {}", username, conn_id),
            ),
        }
        replaced
    }

    /// Remove `username` only if it still belongs to `conn_id`
    ///
    /// A connection closing after its user re-logged elsewhere must not remove
    /// the newer session.
    pub fn logout(&self, username: &str, conn_id: ConnectionId) -> bool {
        let mut sessions = self.sessions.write();
        let owned = sessions
            .get(username)
            .map(|handle| handle.conn_id == conn_id)
            .unwrap_or(false);
        if owned {
            sessions.remove(username);
            drop(sessions);
            self.listeners.write().remove(username);
            logger::info(
                LogTag::Session,
                &format!("{} logged out (connection {})", username, conn_id),
            );
        }
        owned
    }

    pub fn get(&self, username: &str) -> Option<SessionHandle> {
        self.sessions.read().get(username).cloned()
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.sessions.read().contains_key(username)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// Queue a text frame for `username`'s connection
    pub fn push(&self, username: &str, frame: String) -> PushOutcome {
        let Some(handle) = self.get(username) else {
            return PushOutcome::Offline;
        };

        match handle.sender.try_send(frame) {
            Ok(()) => PushOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                logger::warning(
                    LogTag::Session,
                    &format!("Outbound queue full for {}, frame dropped", username),
                );
                PushOutcome::Dropped
            }
            // Connection task already gone; the entry is stale
            Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::Offline,
        }
    }

    /// Register the listener queue for `username`; the last registration wins
    ///
    /// A previously returned receiver stops receiving (its sender is dropped).
    pub fn register_listener(&self, username: &str) -> mpsc::Receiver<ListenerEvent> {
        let (tx, rx) = mpsc::channel(self.listener_buffer);
        self.listeners.write().insert(username.to_string(), tx);
        rx
    }

    fn notify_listener(&self, event: ListenerEvent) -> bool {
        let sender = self.listeners.read().get(&event.to).cloned();
        match sender {
            Some(sender) => sender.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Push the frames an event produces to whichever users are connected
    ///
    /// Offline users are skipped silently.
    pub fn deliver(&self, event: &Event) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        match event {
            Event::NewMessage { from, to, content } => {
                if self.push(to, new_message_text(from, content)) == PushOutcome::Delivered {
                    report.frames += 1;
                    let observed = self.notify_listener(ListenerEvent {
                        from: from.clone(),
                        to: to.clone(),
                        content: content.clone(),
                    });
                    if observed {
                        report.listeners += 1;
                    }
                } else {
                    logger::debug(
                        LogTag::Session,
                        &format!("{} not connected, message from {} not pushed", to, from),
                    );
                }
                if self.push(from, message_sent_text(to, content)) == PushOutcome::Delivered {
                    report.frames += 1;
                }
            }
            Event::FriendAccepted { from, to } => {
                if self.push(from, friend_accepted_text_for_requester(to)) == PushOutcome::Delivered {
                    report.frames += 1;
                }
                if self.push(to, friend_accepted_text_for_accepter(from)) == PushOutcome::Delivered {
                    report.frames += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &SessionRegistry, username: &str) -> (ConnectionId, mpsc::Receiver<String>) {
        let conn_id = registry.next_connection_id();
        let (tx, rx) = mpsc::channel(8);
        registry.login(username, SessionHandle::new(conn_id, tx));
        (conn_id, rx)
    }

    fn chat(from: &str, to: &str, content: &str) -> Event {
        Event::NewMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn message_reaches_connected_recipient() {
        let registry = SessionRegistry::new(4);
        let (_, mut bob_rx) = connect(&registry, "bob");

        let report = registry.deliver(&chat("alice", "bob", "hi"));
        assert_eq!(report.frames, 1);

        let frame = bob_rx.try_recv().unwrap();
        assert!(frame.contains("hi"));
        assert!(frame.contains("alice"));
    }

    #[test]
    fn message_to_absent_recipient_is_dropped_silently() {
        let registry = SessionRegistry::new(4);
        let report = registry.deliver(&chat("alice", "bob", "hi"));
        assert_eq!(report, DeliveryReport::default());
    }

    #[test]
    fn sender_gets_confirmation_when_connected() {
        let registry = SessionRegistry::new(4);
        let (_, mut alice_rx) = connect(&registry, "alice");
        let (_, mut bob_rx) = connect(&registry, "bob");

        assert_eq!(registry.deliver(&chat("alice", "bob", "hello")).frames, 2);
        assert_eq!(bob_rx.try_recv().unwrap(), new_message_text("alice", "hello"));
        assert_eq!(alice_rx.try_recv().unwrap(), message_sent_text("bob", "hello"));
    }

    #[test]
    fn friend_accepted_notifies_both_sides() {
        let registry = SessionRegistry::new(4);
        let (_, mut alice_rx) = connect(&registry, "alice");
        let (_, mut bob_rx) = connect(&registry, "bob");

        let report = registry.deliver(&Event::FriendAccepted {
            from: "alice".to_string(),
            to: "bob".to_string(),
        });
        assert_eq!(report.frames, 2);
        assert!(alice_rx.try_recv().unwrap().contains("bob"));
        assert!(bob_rx.try_recv().unwrap().contains("alice"));
    }

    #[test]
    fn relogin_replaces_and_stale_logout_is_ignored() {
        let registry = SessionRegistry::new(4);
        let (first, mut first_rx) = connect(&registry, "bob");
        let (second, mut second_rx) = connect(&registry, "bob");
        assert_eq!(registry.active_sessions(), 1);

        assert_eq!(registry.push("bob", "ping".to_string()), PushOutcome::Delivered);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().unwrap(), "ping");

        assert!(!registry.logout("bob", first));
        assert!(registry.is_online("bob"));
        assert!(registry.logout("bob", second));
        assert!(!registry.is_online("bob"));
    }

    #[test]
    fn last_listener_registration_wins() {
        let registry = SessionRegistry::new(4);
        let (_, _bob_rx) = connect(&registry, "bob");
        let mut old = registry.register_listener("bob");
        let mut current = registry.register_listener("bob");

        let report = registry.deliver(&chat("alice", "bob", "hi"));
        assert_eq!(report.listeners, 1);
        assert_eq!(
            current.try_recv().unwrap(),
            ListenerEvent {
                from: "alice".to_string(),
                to: "bob".to_string(),
                content: "hi".to_string(),
            }
        );
        assert!(matches!(
            old.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let registry = SessionRegistry::new(4);
        let (tx, _rx) = mpsc::channel(1);
        registry.login("bob", SessionHandle::new(registry.next_connection_id(), tx));

        assert_eq!(registry.push("bob", "one".to_string()), PushOutcome::Delivered);
        assert_eq!(registry.push("bob", "two".to_string()), PushOutcome::Dropped);
    }

    #[test]
    fn closed_connection_counts_as_offline() {
        let registry = SessionRegistry::new(4);
        let (_, rx) = connect(&registry, "bob");
        drop(rx);
        assert_eq!(registry.push("bob", "x".to_string()), PushOutcome::Offline);
    }
}
