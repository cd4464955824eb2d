//! Notification bus
//!
//! Backend workers publish `Event`s after a state change; one supervised
//! `BusConsumer` per gateway instance reads them and pushes frames to the
//! connected users. The in-process broker is always available; Kafka is
//! compiled in with the `kafka` feature.

pub mod consumer;
pub mod event;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod producer;

use std::sync::Arc;

pub use consumer::BusConsumer;
pub use event::{Event, TAG_FRIEND_ACCEPTED, TAG_SEND_MESSAGE};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaPublisher, KafkaSubscription};
pub use memory::{MemoryBroker, MemoryPublisher, MemorySubscription};
pub use producer::{EventPublisher, EventSubscription};

use crate::config::BusConfig;
use crate::errors::GatewayResult;
use crate::logger::{self, LogTag};

/// Publisher and subscription for one gateway process
pub struct BusEndpoints {
    pub publisher: Arc<dyn EventPublisher>,
    pub subscription: Arc<dyn EventSubscription>,
}

/// Build the bus described by `config`
///
/// An empty broker list selects the in-process broker.
pub fn connect(config: &BusConfig) -> GatewayResult<BusEndpoints> {
    if config.brokers.is_empty() {
        logger::info(LogTag::Bus, "No brokers configured, using in-process bus");
        let broker = MemoryBroker::new(config.memory_capacity);
        return Ok(BusEndpoints {
            publisher: Arc::new(broker.publisher()),
            subscription: Arc::new(broker.subscribe()),
        });
    }
    connect_brokers(config)
}

#[cfg(feature = "kafka")]
fn connect_brokers(config: &BusConfig) -> GatewayResult<BusEndpoints> {
    Ok(BusEndpoints {
        publisher: Arc::new(KafkaPublisher::new(config)?),
        subscription: Arc::new(KafkaSubscription::new(config)?),
    })
}

#[cfg(not(feature = "kafka"))]
fn connect_brokers(config: &BusConfig) -> GatewayResult<BusEndpoints> {
    Err(crate::errors::GatewayError::invalid(format!(
        "bus.brokers is set ({}) but this build has no kafka support",
        config.brokers.join(",")
    )))
}
