use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{HashFields, SharedStore};
use crate::errors::GatewayResult;

/// Process-local store
///
/// Every operation runs under one mutex, so compare-and-set is trivially
/// atomic. Expiry uses tokio's clock so paused-time tests can advance it.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    hashes: HashMap<String, HashFields>,
    flags: HashMap<String, (String, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live set-if-absent keys
    pub fn flag_count(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .flags
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn hash_get_all(&self, key: &str) -> GatewayResult<HashFields> {
        Ok(self.state.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        expected: &HashFields,
        new: &HashFields,
    ) -> GatewayResult<bool> {
        let mut state = self.state.lock();

        let matches = match state.hashes.get(key) {
            None => expected.is_empty(),
            Some(current) => {
                !expected.is_empty()
                    && expected
                        .iter()
                        .all(|(field, value)| current.get(field) == Some(value))
            }
        };
        if !matches {
            return Ok(false);
        }

        let entry = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in new {
            entry.insert(field.clone(), value.clone());
        }
        Ok(true)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> GatewayResult<bool> {
        let mut state = self.state.lock();
        let now = Instant::now();

        if let Some((_, expires)) = state.flags.get(key) {
            if *expires > now {
                return Ok(false);
            }
        }

        // Drop anything else that has expired while we hold the lock
        state.flags.retain(|_, (_, expires)| *expires > now);
        state
            .flags
            .insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn compare_and_set_requires_absence_for_empty_expected() {
        let store = MemoryStore::new();
        let first = fields(&[("tokens", "5"), ("last_refill", "100")]);

        assert!(store
            .hash_compare_and_set("bucket", &HashFields::new(), &first)
            .await
            .unwrap());
        // Key now exists, so a second "create" loses
        assert!(!store
            .hash_compare_and_set("bucket", &HashFields::new(), &first)
            .await
            .unwrap());
        assert_eq!(store.hash_get_all("bucket").await.unwrap(), first);
    }

    #[tokio::test]
    async fn compare_and_set_detects_stale_expected() {
        let store = MemoryStore::new();
        let v1 = fields(&[("tokens", "5"), ("last_refill", "100")]);
        let v2 = fields(&[("tokens", "4"), ("last_refill", "100")]);
        store
            .hash_compare_and_set("bucket", &HashFields::new(), &v1)
            .await
            .unwrap();

        assert!(store.hash_compare_and_set("bucket", &v1, &v2).await.unwrap());
        // v1 is stale now
        assert!(!store.hash_compare_and_set("bucket", &v1, &v2).await.unwrap());
        assert!(store.hash_get_all("missing").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_expires() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(600);

        assert!(store.set_if_absent("alice_Register", "1", ttl).await.unwrap());
        assert!(!store.set_if_absent("alice_Register", "1", ttl).await.unwrap());
        assert_eq!(store.flag_count(), 1);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(store.flag_count(), 0);
        assert!(store.set_if_absent("alice_Register", "1", ttl).await.unwrap());
    }
}
