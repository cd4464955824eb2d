//! Shared key-value storage used by the rate limiter and idempotency guard
//!
//! The trait exposes only the atomic primitives those components need: a hash
//! read, a compare-and-set hash write, and set-if-absent with expiry.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::errors::GatewayResult;
use crate::logger::{self, LogTag};

pub type HashFields = HashMap<String, String>;

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// All fields of a hash; empty when the key does not exist
    async fn hash_get_all(&self, key: &str) -> GatewayResult<HashFields>;

    /// Write `new` fields only if the stored hash still matches `expected`
    ///
    /// An empty `expected` means the key must not exist yet. Returns false when
    /// another writer got there first; nothing is written in that case.
    async fn hash_compare_and_set(
        &self,
        key: &str,
        expected: &HashFields,
        new: &HashFields,
    ) -> GatewayResult<bool>;

    /// Create `key` with an expiry unless it already exists
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> GatewayResult<bool>;

    fn backend_name(&self) -> &'static str;
}

/// Build the store selected by configuration
pub async fn connect(config: &StoreConfig) -> GatewayResult<Arc<dyn SharedStore>> {
    match config.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            logger::info(LogTag::System, &format!("Shared store: redis at {}", url));
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(url) => {
            logger::warning(
                LogTag::System,
                &format!(
                    "redis_url '{}' configured but built without the redis feature, using in-memory store",
                    url
                ),
            );
            Ok(Arc::new(MemoryStore::new()))
        }
        None => {
            logger::info(LogTag::System, "Shared store: in-memory (single instance only)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
