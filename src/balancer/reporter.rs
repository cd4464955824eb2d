/// Periodic load reporter
///
/// Samples host CPU usage and POSTs it as the load of every configured
/// endpoint to the `/report_load` URL. Push failures are logged and dropped;
/// the next tick simply tries again.
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::Notify;

use super::LoadReport;
use crate::config::LoadMonitorConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

pub struct LoadReporter {
    client: reqwest::Client,
    report_url: String,
    endpoints: Vec<String>,
    interval: Duration,
    system: System,
}

impl LoadReporter {
    pub fn new(config: &LoadMonitorConfig, endpoints: Vec<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GatewayError::unavailable("load_reporter", e))?;

        Ok(Self {
            client,
            report_url: config.report_url.clone(),
            endpoints,
            interval: Duration::from_secs(config.report_interval_secs.max(1)),
            system: System::new(),
        })
    }

    /// Whole-percent CPU usage across all cores
    ///
    /// The first sample after construction reads 0 because usage is a delta
    /// between refreshes.
    pub fn sample_load(&mut self) -> i64 {
        self.system.refresh_cpu();
        self.system.global_cpu_info().cpu_usage().round() as i64
    }

    pub async fn push(&self, report: &LoadReport) -> GatewayResult<()> {
        let response = self
            .client
            .post(&self.report_url)
            .json(report)
            .send()
            .await
            .map_err(|e| GatewayError::unavailable("load_monitor", e))?;

        if !response.status().is_success() {
            return Err(GatewayError::unavailable(
                "load_monitor",
                format!("report rejected with HTTP {}", response.status()),
            ));
        }
        Ok(())
    }

    pub async fn run(mut self, shutdown: Arc<Notify>) {
        logger::info(
            LogTag::Balancer,
            &format!(
                "Load reporter started ({} endpoints every {}s to {})",
                self.endpoints.len(),
                self.interval.as_secs(),
                self.report_url
            ),
        );

        let mut ticker = tokio::time::interval(self.interval);
        let stop = shutdown.notified();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = &mut stop => {
                    logger::info(LogTag::Balancer, "Load reporter stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let load = self.sample_load();
                    for endpoint in &self.endpoints {
                        let report = LoadReport { endpoint: endpoint.clone(), load };
                        match self.push(&report).await {
                            Ok(()) => logger::debug(
                                LogTag::Balancer,
                                &format!("Reported {} load={}", endpoint, load),
                            ),
                            Err(e) => logger::warning(
                                LogTag::Balancer,
                                &format!("Load report for {} failed: {}", endpoint, e),
                            ),
                        }
                    }
                }
            }
        }
    }
}
