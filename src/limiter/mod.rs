//! Distributed token-bucket rate limiter
//!
//! Bucket state lives in the shared store as a hash with `tokens` and
//! `last_refill` fields, one key per scope. Each check is a read followed by a
//! compare-and-set write; a lost race re-reads and tries again, and persistent
//! contention denies rather than risk granting a token twice.

pub mod token_bucket;

use std::sync::Arc;

use crate::breaker::CircuitBreakers;
use crate::config::{RateLimitConfig, RATE_LIMIT_BREAKER};
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};
use crate::store::SharedStore;

pub use token_bucket::TokenBucket;

/// Attempts before a contended bucket gives up and denies
const MAX_CAS_ATTEMPTS: usize = 5;

/// Source of unix seconds; injectable so tests control refills
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Global,
    PerIp,
}

impl RateLimitScope {
    pub fn parse(value: &str) -> GatewayResult<Self> {
        match value {
            "global" => Ok(RateLimitScope::Global),
            "per_ip" => Ok(RateLimitScope::PerIp),
            other => Err(GatewayError::invalid(format!(
                "unknown rate limit scope '{}'",
                other
            ))),
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    rate: i64,
    capacity: i64,
    scope: RateLimitScope,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, config: &RateLimitConfig) -> GatewayResult<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn SharedStore>,
        config: &RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> GatewayResult<Self> {
        if config.capacity < 1 {
            return Err(GatewayError::invalid("rate limit capacity must be >= 1"));
        }
        Ok(Self {
            store,
            clock,
            rate: config.rate.max(0),
            capacity: config.capacity,
            scope: RateLimitScope::parse(&config.scope)?,
            key_prefix: config.key_prefix.clone(),
        })
    }

    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    /// Storage key for a request from `client_ip` under the configured scope
    pub fn key_for(&self, client_ip: Option<&str>) -> String {
        Self::key_for_scope(&self.key_prefix, self.scope, client_ip)
    }

    pub fn key_for_scope(prefix: &str, scope: RateLimitScope, client_ip: Option<&str>) -> String {
        match (scope, client_ip) {
            (RateLimitScope::PerIp, Some(ip)) => format!("{}:ip:{}", prefix, ip),
            // Unknown peers share one bucket rather than bypassing the limit
            (RateLimitScope::PerIp, None) => format!("{}:ip:unknown", prefix),
            (RateLimitScope::Global, _) => format!("{}:global", prefix),
        }
    }

    /// Try to take one token from the bucket at `key`
    ///
    /// `Ok(false)` means denied. Errors are storage faults, never denials.
    pub async fn allow(&self, key: &str) -> GatewayResult<bool> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let now = self.clock.now_secs();
            let stored = self.store.hash_get_all(key).await?;

            let bucket = TokenBucket::from_fields(&stored)?
                .unwrap_or_else(|| TokenBucket::full(self.capacity, now))
                .refilled(now, self.rate, self.capacity);

            let Some(next) = bucket.take(now) else {
                logger::debug(
                    LogTag::Limiter,
                    &format!("Denied key={} tokens={}", key, bucket.tokens),
                );
                return Ok(false);
            };

            if self
                .store
                .hash_compare_and_set(key, &stored, &next.to_fields())
                .await?
            {
                logger::debug(
                    LogTag::Limiter,
                    &format!("Allowed key={} tokens_left={}", key, next.tokens),
                );
                return Ok(true);
            }

            logger::debug(
                LogTag::Limiter,
                &format!("Bucket {} changed concurrently (attempt {})", key, attempt),
            );
        }

        logger::warning(
            LogTag::Limiter,
            &format!("Bucket {} too contended, denying", key),
        );
        Ok(false)
    }

    /// `allow` run through the `rate_limit_allow` breaker
    ///
    /// Once the breaker trips, or the check times out, requests are denied.
    pub async fn allow_protected(&self, breakers: &CircuitBreakers, key: &str) -> GatewayResult<bool> {
        breakers
            .protect(
                RATE_LIMIT_BREAKER,
                || self.allow(key),
                |cause| async move {
                    logger::warning(
                        LogTag::Limiter,
                        &format!("Rate limit check failed, denying: {}", cause),
                    );
                    Ok(false)
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakersConfig;
    use crate::store::{HashFields, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn new(start: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(start)))
        }

        fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_secs(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Yields between every store call so concurrent checks interleave
    struct YieldingStore(MemoryStore);

    #[async_trait]
    impl SharedStore for YieldingStore {
        async fn hash_get_all(&self, key: &str) -> GatewayResult<HashFields> {
            tokio::task::yield_now().await;
            self.0.hash_get_all(key).await
        }

        async fn hash_compare_and_set(
            &self,
            key: &str,
            expected: &HashFields,
            new: &HashFields,
        ) -> GatewayResult<bool> {
            tokio::task::yield_now().await;
            self.0.hash_compare_and_set(key, expected, new).await
        }

        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> GatewayResult<bool> {
            self.0.set_if_absent(key, value, ttl).await
        }

        fn backend_name(&self) -> &'static str {
            "yielding"
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SharedStore for BrokenStore {
        async fn hash_get_all(&self, _key: &str) -> GatewayResult<HashFields> {
            Err(GatewayError::unavailable("redis", "connection refused"))
        }

        async fn hash_compare_and_set(
            &self,
            _key: &str,
            _expected: &HashFields,
            _new: &HashFields,
        ) -> GatewayResult<bool> {
            Err(GatewayError::unavailable("redis", "connection refused"))
        }

        async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> GatewayResult<bool> {
            Err(GatewayError::unavailable("redis", "connection refused"))
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    fn limit_config(rate: i64, capacity: i64) -> RateLimitConfig {
        RateLimitConfig {
            rate,
            capacity,
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test]
    async fn fresh_key_allows_capacity_then_denies() {
        let clock = ManualClock::new(1_000);
        let limiter =
            RateLimiter::with_clock(Arc::new(MemoryStore::new()), &limit_config(1, 5), clock)
                .unwrap();

        for _ in 0..5 {
            assert!(limiter.allow("rate_limit:global").await.unwrap());
        }
        assert!(!limiter.allow("rate_limit:global").await.unwrap());
    }

    #[tokio::test]
    async fn bucket_refills_after_capacity_over_rate_seconds() {
        let clock = ManualClock::new(1_000);
        let limiter = RateLimiter::with_clock(
            Arc::new(MemoryStore::new()),
            &limit_config(2, 6),
            clock.clone(),
        )
        .unwrap();

        for _ in 0..6 {
            assert!(limiter.allow("k").await.unwrap());
        }
        assert!(!limiter.allow("k").await.unwrap());

        clock.advance(3);
        for _ in 0..6 {
            assert!(limiter.allow("k").await.unwrap());
        }
        assert!(!limiter.allow("k").await.unwrap());
    }

    #[tokio::test]
    async fn denial_does_not_reset_refill_time() {
        let clock = ManualClock::new(0);
        let limiter = RateLimiter::with_clock(
            Arc::new(MemoryStore::new()),
            &limit_config(1, 1),
            clock.clone(),
        )
        .unwrap();

        assert!(limiter.allow("k").await.unwrap());
        for _ in 0..3 {
            assert!(!limiter.allow("k").await.unwrap());
        }
        clock.advance(1);
        assert!(limiter.allow("k").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_callers_never_exceed_capacity() {
        let clock = ManualClock::new(500);
        let limiter = Arc::new(
            RateLimiter::with_clock(
                Arc::new(YieldingStore(MemoryStore::new())),
                &limit_config(1, 10),
                clock,
            )
            .unwrap(),
        );
        let granted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            let granted = granted.clone();
            handles.push(tokio::spawn(async move {
                if limiter.allow("shared").await.unwrap() {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let granted = granted.load(Ordering::SeqCst);
        assert!(granted >= 1);
        assert!(granted <= 10, "granted {} tokens from a bucket of 10", granted);
    }

    #[tokio::test]
    async fn storage_errors_are_distinct_from_denial() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), &limit_config(1, 5)).unwrap();
        let err = limiter.allow("k").await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn protected_check_denies_on_storage_failure() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), &limit_config(1, 5)).unwrap();
        let breakers = CircuitBreakers::new(BreakersConfig::default());
        assert!(!limiter.allow_protected(&breakers, "k").await.unwrap());
    }

    #[test]
    fn keys_follow_scope() {
        assert_eq!(
            RateLimiter::key_for_scope("rate_limit", RateLimitScope::Global, Some("10.0.0.1")),
            "rate_limit:global"
        );
        assert_eq!(
            RateLimiter::key_for_scope("rate_limit", RateLimitScope::PerIp, Some("10.0.0.1")),
            "rate_limit:ip:10.0.0.1"
        );
        assert!(RateLimitScope::parse("per_user").is_err());
    }
}
