use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::balancer::LoadReporter;
use crate::config::{Config, LoadMonitorConfig};
use crate::errors::{GatewayError, GatewayResult};
use crate::services::Service;

pub struct LoadReporterService {
    config: LoadMonitorConfig,
    endpoints: Vec<String>,
    reporter: Option<LoadReporter>,
}

impl LoadReporterService {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.load_monitor.clone(),
            endpoints: config.rpc.all_endpoints(),
            reporter: None,
        }
    }
}

#[async_trait]
impl Service for LoadReporterService {
    fn name(&self) -> &'static str {
        "load_reporter"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["gateway"]
    }

    fn is_enabled(&self, config: &Config) -> bool {
        config.load_monitor.reporter_enabled
    }

    async fn initialize(&mut self) -> GatewayResult<()> {
        self.reporter = Some(LoadReporter::new(&self.config, self.endpoints.clone())?);
        Ok(())
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> GatewayResult<Vec<JoinHandle<()>>> {
        let reporter = self
            .reporter
            .take()
            .ok_or_else(|| GatewayError::Fatal("load reporter was not initialized".to_string()))?;
        Ok(vec![tokio::spawn(reporter.run(shutdown))])
    }
}
