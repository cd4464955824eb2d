/// Long-running bus consumer
///
/// Reads payloads one at a time, decodes them, and pushes the resulting
/// frames through the session registry. A payload that fails to decode is
/// logged and skipped. Consecutive read failures are retried with a fixed
/// backoff; once the retries are spent `run` returns `GatewayError::Fatal`
/// so the supervisor sees the consumer die.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::event::Event;
use super::producer::EventSubscription;
use crate::config::BusConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};
use crate::session::{DeliveryReport, SessionRegistry};

pub struct BusConsumer {
    subscription: Arc<dyn EventSubscription>,
    registry: Arc<SessionRegistry>,
    read_retries: u32,
    retry_backoff: Duration,
}

impl BusConsumer {
    pub fn new(
        subscription: Arc<dyn EventSubscription>,
        registry: Arc<SessionRegistry>,
        config: &BusConfig,
    ) -> Self {
        Self {
            subscription,
            registry,
            read_retries: config.read_retries,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }

    /// Consume until shutdown (`Ok`) or until reads keep failing (`Err(Fatal)`)
    pub async fn run(&self, shutdown: Arc<Notify>) -> GatewayResult<()> {
        logger::info(LogTag::Bus, "Bus consumer started");
        let mut consecutive_failures: u32 = 0;
        // Registered once so a notification during message handling is not lost
        let stop = shutdown.notified();
        tokio::pin!(stop);

        loop {
            let next = tokio::select! {
                _ = &mut stop => {
                    logger::info(LogTag::Bus, "Bus consumer stopping");
                    return Ok(());
                }
                next = self.subscription.next_payload() => next,
            };

            match next {
                Ok(payload) => {
                    consecutive_failures = 0;
                    if let Err(e) = self.handle_payload(&payload) {
                        logger::warning(
                            LogTag::Bus,
                            &format!("Dropping bus message '{}': {}", payload, e),
                        );
                    }
                }
                Err(GatewayError::InvalidInput(reason)) => {
                    logger::warning(LogTag::Bus, &format!("Dropping bus message: {}", reason));
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures > self.read_retries {
                        logger::error(
                            LogTag::Bus,
                            &format!(
                                "Bus read failed {} times in a row, consumer exiting: {}",
                                consecutive_failures, e
                            ),
                        );
                        return Err(GatewayError::Fatal(format!(
                            "bus consumer gave up after {} read failures: {}",
                            consecutive_failures, e
                        )));
                    }
                    logger::warning(
                        LogTag::Bus,
                        &format!(
                            "Bus read failed ({}/{}), retrying in {}s: {}",
                            consecutive_failures,
                            self.read_retries,
                            self.retry_backoff.as_secs(),
                            e
                        ),
                    );
                    tokio::select! {
                        _ = &mut stop => return Ok(()),
                        _ = tokio::time::sleep(self.retry_backoff) => {}
                    }
                }
            }
        }
    }

    /// Decode one payload and deliver it to whoever is connected
    pub fn handle_payload(&self, payload: &str) -> GatewayResult<DeliveryReport> {
        let event = Event::decode(payload)?;
        let report = self.registry.deliver(&event);
        logger::debug(
            LogTag::Bus,
            &format!(
                "Delivered {}: {} frames, {} listeners",
                event, report.frames, report.listeners
            ),
        );
        Ok(report)
    }
}
