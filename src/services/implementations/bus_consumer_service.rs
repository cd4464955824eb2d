/// Supervisor for the single bus consumer of this process
///
/// A consumer that dies with a fatal error is rebuilt after a delay, up to
/// `max_restarts` times; after that the service reports `Unhealthy` and
/// notifications stop until the process restarts.
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::bus::{BusConsumer, EventSubscription};
use crate::config::BusConfig;
use crate::errors::GatewayResult;
use crate::logger::{self, LogTag};
use crate::services::{Service, ServiceHealth};
use crate::session::SessionRegistry;

pub struct BusConsumerService {
    subscription: Arc<dyn EventSubscription>,
    registry: Arc<SessionRegistry>,
    config: BusConfig,
    health: Arc<RwLock<ServiceHealth>>,
}

impl BusConsumerService {
    pub fn new(
        subscription: Arc<dyn EventSubscription>,
        registry: Arc<SessionRegistry>,
        config: BusConfig,
    ) -> Self {
        Self {
            subscription,
            registry,
            config,
            health: Arc::new(RwLock::new(ServiceHealth::Starting)),
        }
    }
}

#[async_trait]
impl Service for BusConsumerService {
    fn name(&self) -> &'static str {
        "bus_consumer"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> GatewayResult<Vec<JoinHandle<()>>> {
        let supervisor = supervise(
            self.subscription.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.health.clone(),
            shutdown,
        );
        Ok(vec![tokio::spawn(supervisor)])
    }

    async fn stop(&mut self) -> GatewayResult<()> {
        let mut health = self.health.write();
        if !health.is_unhealthy() {
            *health = ServiceHealth::Stopping;
        }
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        self.health.read().clone()
    }
}

async fn supervise(
    subscription: Arc<dyn EventSubscription>,
    registry: Arc<SessionRegistry>,
    config: BusConfig,
    health: Arc<RwLock<ServiceHealth>>,
    shutdown: Arc<Notify>,
) {
    let restart_delay = Duration::from_secs(config.restart_delay_secs);
    let mut restarts: u32 = 0;
    let stop = shutdown.notified();
    tokio::pin!(stop);

    loop {
        let consumer = BusConsumer::new(subscription.clone(), registry.clone(), &config);
        if restarts == 0 {
            *health.write() = ServiceHealth::Healthy;
        }

        let result = tokio::select! {
            _ = &mut stop => return,
            result = consumer.run(shutdown.clone()) => result,
        };

        match result {
            Ok(()) => return,
            Err(e) if restarts >= config.max_restarts => {
                logger::error(
                    LogTag::Bus,
                    &format!(
                        "Bus consumer failed after {} restarts, giving up: {}",
                        restarts, e
                    ),
                );
                *health.write() = ServiceHealth::Unhealthy(e.to_string());
                return;
            }
            Err(e) => {
                restarts += 1;
                logger::warning(
                    LogTag::Bus,
                    &format!(
                        "Bus consumer died ({}), restart {}/{} in {}s",
                        e,
                        restarts,
                        config.max_restarts,
                        restart_delay.as_secs()
                    ),
                );
                *health.write() = ServiceHealth::Degraded(e.to_string());
                tokio::select! {
                    _ = &mut stop => return,
                    _ = tokio::time::sleep(restart_delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct DeadBroker {
        reads: AtomicU32,
    }

    #[async_trait]
    impl EventSubscription for DeadBroker {
        async fn next_payload(&self) -> GatewayResult<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::unavailable("bus", "connection refused"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_restarts_and_reports_unhealthy() {
        let broker = Arc::new(DeadBroker {
            reads: AtomicU32::new(0),
        });
        let config = BusConfig {
            max_restarts: 2,
            ..BusConfig::default()
        };
        let reads_per_run = config.read_retries + 1;
        let mut service =
            BusConsumerService::new(broker.clone(), Arc::new(SessionRegistry::new(4)), config);

        let handles = service.start(Arc::new(Notify::new())).await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(service.health().await.is_unhealthy());
        // The first run plus two restarts
        assert_eq!(broker.reads.load(Ordering::SeqCst), reads_per_run * 3);
    }
}
