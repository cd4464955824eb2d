//! Publisher and subscription seams of the notification bus

use async_trait::async_trait;

use super::event::Event;
use crate::errors::GatewayResult;

/// Writes events to the bus
///
/// `publish` returns once the broker acknowledged the event, or with the
/// error that prevented it. Callers decide what a failed publish means for
/// their own durable write.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &Event) -> GatewayResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Sequential reader of raw bus payloads
///
/// An `Err` is a broker read failure. Undecodable payloads are returned as
/// `Ok` and rejected by the consumer.
#[async_trait]
pub trait EventSubscription: Send + Sync {
    async fn next_payload(&self) -> GatewayResult<String>;
}
