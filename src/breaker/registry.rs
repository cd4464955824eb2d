use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::state::{BreakerStatus, CircuitBreaker};
use crate::config::BreakersConfig;
use crate::errors::{GatewayError, GatewayResult};

/// Breakers keyed by name, created on first use with that name's settings
pub struct CircuitBreakers {
    config: BreakersConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: BreakersConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return existing.clone();
        }
        self.breakers
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.settings_for(name))))
            .clone()
    }

    /// Run `operation` under the breaker called `name`
    pub async fn protect<T, Op, OpFut, Fb, FbFut>(
        &self,
        name: &str,
        operation: Op,
        fallback: Fb,
    ) -> GatewayResult<T>
    where
        Op: FnOnce() -> OpFut,
        OpFut: Future<Output = GatewayResult<T>>,
        Fb: FnOnce(GatewayError) -> FbFut,
        FbFut: Future<Output = GatewayResult<T>>,
    {
        let breaker = self.get(name);
        breaker.protect(operation, fallback).await
    }

    pub fn status(&self, name: &str) -> Option<BreakerStatus> {
        self.breakers.read().get(name).map(|b| b.status())
    }

    /// Status of every breaker used so far, sorted by name
    pub fn all_status(&self) -> Vec<BreakerStatus> {
        let mut all: Vec<BreakerStatus> = self.breakers.read().values().map(|b| b.status()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
