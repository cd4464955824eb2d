/// In-process broker
///
/// One bounded queue per broker. All subscriptions share the receiving end,
/// so each event is read by exactly one of them, like members of a single
/// consumer group.
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use super::event::Event;
use super::producer::{EventPublisher, EventSubscription};
use crate::errors::{GatewayError, GatewayResult};

pub struct MemoryBroker {
    sender: mpsc::Sender<String>,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl MemoryBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> MemorySubscription {
        MemorySubscription {
            receiver: self.receiver.clone(),
        }
    }

    /// Queue a raw payload, bypassing the event encoder
    pub async fn publish_raw(&self, payload: &str) -> GatewayResult<()> {
        self.sender
            .send(payload.to_string())
            .await
            .map_err(|_| GatewayError::unavailable("bus", "broker closed"))
    }
}

#[derive(Clone)]
pub struct MemoryPublisher {
    sender: mpsc::Sender<String>,
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &Event) -> GatewayResult<()> {
        // Waits for queue space; that wait is the acknowledgment
        self.sender
            .send(event.encode())
            .await
            .map_err(|_| GatewayError::unavailable("bus", "broker closed"))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Clone)]
pub struct MemorySubscription {
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
}

#[async_trait]
impl EventSubscription for MemorySubscription {
    async fn next_payload(&self) -> GatewayResult<String> {
        self.receiver
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| GatewayError::unavailable("bus", "broker closed"))
    }
}
