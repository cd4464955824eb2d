/// Shared application state for the gateway
///
/// Every component is constructed once at startup and handed to the router,
/// the connection tasks and the background services through this struct.
use std::sync::Arc;
use std::time::Duration;

use crate::balancer::LoadMonitor;
use crate::breaker::CircuitBreakers;
use crate::bus::EventPublisher;
use crate::config::Config;
use crate::errors::GatewayResult;
use crate::idempotency::IdempotencyGuard;
use crate::limiter::RateLimiter;
use crate::rpc::Backends;
use crate::session::SessionRegistry;
use crate::store::SharedStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub monitor: Arc<LoadMonitor>,
    /// `None` when rate limiting is disabled
    pub limiter: Option<Arc<RateLimiter>>,
    pub breakers: Arc<CircuitBreakers>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub backends: Arc<dyn Backends>,
    pub publisher: Arc<dyn EventPublisher>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

/// Collaborators built outside the gateway
pub struct ExternalServices {
    pub store: Arc<dyn SharedStore>,
    pub backends: Arc<dyn Backends>,
    pub publisher: Arc<dyn EventPublisher>,
    pub breakers: Arc<CircuitBreakers>,
    pub monitor: Arc<LoadMonitor>,
}

impl AppState {
    pub fn new(config: Config, external: ExternalServices) -> GatewayResult<Self> {
        let limiter = if config.rate_limit.enabled {
            Some(Arc::new(RateLimiter::new(
                external.store.clone(),
                &config.rate_limit,
            )?))
        } else {
            None
        };

        let idempotency = Arc::new(IdempotencyGuard::new(
            external.store,
            Duration::from_secs(config.idempotency.ttl_secs),
        ));

        Ok(Self {
            sessions: Arc::new(SessionRegistry::new(config.session.listener_buffer)),
            monitor: external.monitor,
            limiter,
            breakers: external.breakers,
            idempotency,
            backends: external.backends,
            publisher: external.publisher,
            config: Arc::new(config),
            startup_time: chrono::Utc::now(),
        })
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (chrono::Utc::now() - self.startup_time)
            .num_seconds()
            .max(0) as u64
    }
}
