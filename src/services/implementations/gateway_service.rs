use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::errors::GatewayResult;
use crate::gateway::{self, AppState};
use crate::logger::{self, LogTag};
use crate::services::{Service, ServiceHealth};

pub struct GatewayService {
    state: Arc<AppState>,
    health: Arc<RwLock<ServiceHealth>>,
}

impl GatewayService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            health: Arc::new(RwLock::new(ServiceHealth::Starting)),
        }
    }
}

#[async_trait]
impl Service for GatewayService {
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["bus_consumer"]
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> GatewayResult<Vec<JoinHandle<()>>> {
        // Bind before spawning so a taken port fails startup instead of a background task
        let listener = gateway::server::bind(&self.state.config.server.bind_address()).await?;

        let state = self.state.clone();
        let health = self.health.clone();
        *health.write() = ServiceHealth::Healthy;

        let handle = tokio::spawn(async move {
            if let Err(e) = gateway::serve(listener, state, shutdown).await {
                logger::error(LogTag::Gateway, &format!("Gateway server failed: {}", e));
                *health.write() = ServiceHealth::Unhealthy(e.to_string());
            }
        });
        Ok(vec![handle])
    }

    async fn stop(&mut self) -> GatewayResult<()> {
        *self.health.write() = ServiceHealth::Stopping;
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        self.health.read().clone()
    }
}
