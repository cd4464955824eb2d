//! Kafka back end (feature `kafka`)

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;

use super::event::Event;
use super::producer::{EventPublisher, EventSubscription};
use crate::config::BusConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

fn client_config(config: &BusConfig) -> GatewayResult<ClientConfig> {
    if config.brokers.is_empty() {
        return Err(GatewayError::invalid("bus.brokers is empty"));
    }
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", config.brokers.join(","));
    Ok(client)
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: &BusConfig) -> GatewayResult<Self> {
        let producer: FutureProducer = client_config(config)?
            .set("message.timeout.ms", SEND_TIMEOUT.as_millis().to_string())
            .create()
            .map_err(|e| GatewayError::unavailable("kafka", e))?;

        logger::info(
            LogTag::Bus,
            &format!("Kafka producer ready for topic '{}'", config.topic),
        );
        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, event: &Event) -> GatewayResult<()> {
        let payload = event.encode();
        let key = match event {
            Event::NewMessage { to, .. } | Event::FriendAccepted { to, .. } => to.as_str(),
        };
        let record = FutureRecord::to(&self.topic).payload(&payload).key(key);

        match self.producer.send(record, SEND_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(GatewayError::unavailable("kafka", e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "kafka"
    }
}

pub struct KafkaSubscription {
    consumer: StreamConsumer,
}

impl KafkaSubscription {
    /// Join `config.group_id` on `config.topic`, reading from the earliest
    /// uncommitted offset
    pub fn new(config: &BusConfig) -> GatewayResult<Self> {
        let consumer: StreamConsumer = client_config(config)?
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| GatewayError::unavailable("kafka", e))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| GatewayError::unavailable("kafka", e))?;

        logger::info(
            LogTag::Bus,
            &format!(
                "Kafka consumer joined group '{}' on topic '{}'",
                config.group_id, config.topic
            ),
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl EventSubscription for KafkaSubscription {
    async fn next_payload(&self) -> GatewayResult<String> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| GatewayError::unavailable("kafka", e))?;

        match message.payload() {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|_| GatewayError::invalid("payload is not UTF-8")),
            None => Ok(String::new()),
        }
    }
}
