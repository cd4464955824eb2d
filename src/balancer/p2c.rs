use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::LoadMonitor;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

pub const DEFAULT_FORCED_SELECTION_INTERVAL: Duration = Duration::from_secs(600);

/// Power-of-two-choices endpoint selector
///
/// Samples two distinct candidates and keeps the less loaded one. Once per
/// forced interval it instead sweeps every candidate and returns the global
/// minimum, so an endpoint that keeps losing the random draw still gets
/// picked when it is the least loaded. A fresh selector sweeps on first use.
pub struct P2cSelector {
    monitor: Arc<LoadMonitor>,
    forced_interval: Duration,
    last_forced: Mutex<Option<Instant>>,
}

impl P2cSelector {
    pub fn new(monitor: Arc<LoadMonitor>) -> Self {
        Self::with_interval(monitor, DEFAULT_FORCED_SELECTION_INTERVAL)
    }

    pub fn with_interval(monitor: Arc<LoadMonitor>, forced_interval: Duration) -> Self {
        Self {
            monitor,
            forced_interval,
            last_forced: Mutex::new(None),
        }
    }

    pub fn monitor(&self) -> &Arc<LoadMonitor> {
        &self.monitor
    }

    pub fn select(&self, endpoints: &[String]) -> GatewayResult<String> {
        match endpoints.len() {
            0 => Err(GatewayError::invalid("no endpoints to select from")),
            1 => Ok(endpoints[0].clone()),
            _ if self.sweep_due() => Ok(self.pick_lowest(endpoints)),
            n => {
                let mut rng = rand::thread_rng();
                let first = rng.gen_range(0..n);
                let mut second = rng.gen_range(0..n);
                while second == first {
                    second = rng.gen_range(0..n);
                }

                let (a, b) = (&endpoints[first], &endpoints[second]);
                let (load_a, load_b) = (self.monitor.get_load(a), self.monitor.get_load(b));
                logger::debug(
                    LogTag::Balancer,
                    &format!("P2C {}={} vs {}={}", a, load_a, b, load_b),
                );

                Ok(if load_a <= load_b { a.clone() } else { b.clone() })
            }
        }
    }

    fn sweep_due(&self) -> bool {
        match *self.last_forced.lock() {
            None => true,
            Some(at) => at.elapsed() >= self.forced_interval,
        }
    }

    /// Global minimum, first occurrence on ties; restarts the forced interval
    fn pick_lowest(&self, endpoints: &[String]) -> String {
        let mut best = &endpoints[0];
        let mut best_load = self.monitor.get_load(best);
        for endpoint in &endpoints[1..] {
            let load = self.monitor.get_load(endpoint);
            if load < best_load {
                best = endpoint;
                best_load = load;
            }
        }

        *self.last_forced.lock() = Some(Instant::now());
        logger::debug(
            LogTag::Balancer,
            &format!("Forced sweep over {} endpoints picked {} (load {})", endpoints.len(), best, best_load),
        );
        best.clone()
    }
}
