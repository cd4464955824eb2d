/// Duplicate-request guard backed by the shared store
///
/// A key records that an operation was *attempted*: it is created before the
/// operation runs and is not removed if the operation later fails. Retries
/// inside the ttl window are answered without re-running the side effect.
use std::sync::Arc;
use std::time::Duration;

use crate::errors::GatewayResult;
use crate::logger::{self, LogTag};
use crate::store::SharedStore;

/// Operations with deterministic per-user keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "Register",
        }
    }
}

pub struct IdempotencyGuard {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `"{username}_{Operation}"`, e.g. `alice_Register`
    pub fn request_key(username: &str, operation: Operation) -> String {
        format!("{}_{}", username, operation.as_str())
    }

    /// True the first time `key` is seen within `ttl`, false until it expires
    pub async fn check_and_set(&self, key: &str, ttl: Duration) -> GatewayResult<bool> {
        let first = self.store.set_if_absent(key, "1", ttl).await?;
        if !first {
            logger::debug(LogTag::Gateway, &format!("Duplicate request suppressed: {}", key));
        }
        Ok(first)
    }

    /// `check_and_set` for a user operation with the configured ttl
    pub async fn first_attempt(&self, username: &str, operation: Operation) -> GatewayResult<bool> {
        let key = Self::request_key(username, operation);
        self.check_and_set(&key, self.ttl).await
    }
}
