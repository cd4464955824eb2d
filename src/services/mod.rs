mod health;
pub mod implementations;

pub use health::ServiceHealth;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Long-running background component managed by `ServiceManager`
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service identifier
    fn name(&self) -> &'static str;

    /// Service priority (lower = starts earlier, stops later)
    fn priority(&self) -> i32 {
        100
    }

    /// Services this service depends on
    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    fn is_enabled(&self, _config: &Config) -> bool {
        true
    }

    async fn initialize(&mut self) -> GatewayResult<()> {
        Ok(())
    }

    /// Spawn the service's tasks; they must exit once `shutdown` is notified
    async fn start(&mut self, shutdown: Arc<Notify>) -> GatewayResult<Vec<JoinHandle<()>>>;

    async fn stop(&mut self) -> GatewayResult<()> {
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

pub struct ServiceManager {
    services: HashMap<&'static str, Box<dyn Service>>,
    handles: HashMap<&'static str, Vec<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
    config: Arc<Config>,
}

impl ServiceManager {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            services: HashMap::new(),
            handles: HashMap::new(),
            shutdown: Arc::new(Notify::new()),
            config,
        }
    }

    pub fn register(&mut self, service: Box<dyn Service>) {
        let name = service.name();
        self.services.insert(name, service);
    }

    /// Start all enabled services in dependency and priority order
    pub async fn start_all(&mut self) -> GatewayResult<()> {
        logger::info(LogTag::System, "Starting all services...");

        let enabled: Vec<&'static str> = self
            .services
            .iter()
            .filter(|(_, service)| service.is_enabled(&self.config))
            .map(|(name, _)| *name)
            .collect();

        let ordered = self.resolve_startup_order(&enabled)?;
        logger::info(
            LogTag::System,
            &format!("Service startup order: {:?}", ordered),
        );

        for name in ordered {
            if let Some(service) = self.services.get_mut(name) {
                logger::debug(LogTag::System, &format!("Initializing service: {}", name));
                service.initialize().await?;

                let handles = service.start(self.shutdown.clone()).await?;
                self.handles.insert(name, handles);
                logger::info(LogTag::System, &format!("Service started: {}", name));
            }
        }

        logger::info(LogTag::System, "All services started");
        Ok(())
    }

    /// Stop all running services in reverse startup order
    pub async fn stop_all(&mut self) -> GatewayResult<()> {
        logger::info(LogTag::System, "Stopping all services...");
        self.shutdown.notify_waiters();

        let running: Vec<&'static str> = self.handles.keys().copied().collect();
        let mut ordered = self.resolve_startup_order(&running)?;
        ordered.reverse();

        for name in ordered {
            if let Some(service) = self.services.get_mut(name) {
                if let Err(e) = service.stop().await {
                    logger::warning(
                        LogTag::System,
                        &format!("Service stop error for {}: {}", name, e),
                    );
                }

                if let Some(handles) = self.handles.remove(name) {
                    for handle in handles {
                        if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                            logger::warning(
                                LogTag::System,
                                &format!("Service {} did not stop within {}s", name, STOP_TIMEOUT.as_secs()),
                            );
                        }
                    }
                }
                logger::info(LogTag::System, &format!("Service stopped: {}", name));
            }
        }

        logger::info(LogTag::System, "All services stopped");
        Ok(())
    }

    fn resolve_startup_order(&self, services: &[&'static str]) -> GatewayResult<Vec<&'static str>> {
        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        fn visit(
            name: &'static str,
            services: &HashMap<&'static str, Box<dyn Service>>,
            ordered: &mut Vec<&'static str>,
            visited: &mut HashSet<&'static str>,
            visiting: &mut HashSet<&'static str>,
        ) -> GatewayResult<()> {
            if visited.contains(name) {
                return Ok(());
            }
            if visiting.contains(name) {
                return Err(GatewayError::Fatal(format!(
                    "Circular dependency detected for service: {}",
                    name
                )));
            }

            visiting.insert(name);
            if let Some(service) = services.get(name) {
                for dep in service.dependencies() {
                    visit(dep, services, ordered, visited, visiting)?;
                }
            }
            visiting.remove(name);
            visited.insert(name);
            ordered.push(name);
            Ok(())
        }

        for &name in services {
            visit(name, &self.services, &mut ordered, &mut visited, &mut visiting)?;
        }

        // Stable sort keeps dependency order among equal priorities
        ordered.sort_by_key(|name| self.services.get(name).map(|s| s.priority()).unwrap_or(100));
        Ok(ordered)
    }

    pub async fn get_health(&self) -> HashMap<&'static str, ServiceHealth> {
        let mut health = HashMap::new();
        for (name, service) in &self.services {
            health.insert(*name, service.health().await);
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        priority: i32,
        deps: Vec<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Service for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn dependencies(&self) -> Vec<&'static str> {
            self.deps.clone()
        }

        async fn start(&mut self, _shutdown: Arc<Notify>) -> GatewayResult<Vec<JoinHandle<()>>> {
            self.log.lock().push(format!("start {}", self.name));
            Ok(vec![tokio::spawn(async {})])
        }

        async fn stop(&mut self) -> GatewayResult<()> {
            self.log.lock().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        priority: i32,
        deps: Vec<&'static str>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn Service> {
        Box::new(Recorder {
            name,
            priority,
            deps,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn starts_by_priority_and_stops_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(Arc::new(Config::default()));
        manager.register(recorder("gateway", 30, vec![], &log));
        manager.register(recorder("bus_consumer", 20, vec![], &log));

        manager.start_all().await.unwrap();
        manager.stop_all().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["start bus_consumer", "start gateway", "stop gateway", "stop bus_consumer"]
        );
    }

    #[tokio::test]
    async fn circular_dependencies_are_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(Arc::new(Config::default()));
        manager.register(recorder("a", 10, vec!["b"], &log));
        manager.register(recorder("b", 10, vec!["a"], &log));

        assert!(matches!(manager.start_all().await, Err(GatewayError::Fatal(_))));
    }
}
