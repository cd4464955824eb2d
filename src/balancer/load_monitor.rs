use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One load sample pushed by (or on behalf of) a backend replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub endpoint: String,
    pub load: i64,
}

/// Last reported load per endpoint
///
/// Reports overwrite; no history or smoothing is kept.
#[derive(Debug, Default)]
pub struct LoadMonitor {
    loads: RwLock<HashMap<String, i64>>,
}

impl LoadMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_load(&self, endpoint: &str, load: i64) {
        self.loads.write().insert(endpoint.to_string(), load);
    }

    /// Last known load, 0 for an endpoint that never reported
    pub fn get_load(&self, endpoint: &str) -> i64 {
        self.loads.read().get(endpoint).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.loads.read().clone()
    }
}
