//! Token bucket arithmetic, independent of where the bucket is stored

use crate::errors::{GatewayError, GatewayResult};
use crate::store::HashFields;

pub const FIELD_TOKENS: &str = "tokens";
pub const FIELD_LAST_REFILL: &str = "last_refill";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucket {
    pub tokens: i64,
    /// Unix seconds
    pub last_refill: i64,
}

impl TokenBucket {
    /// A bucket seen for the first time starts full
    pub fn full(capacity: i64, now: i64) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Decode stored fields; `None` when the key did not exist
    pub fn from_fields(fields: &HashFields) -> GatewayResult<Option<Self>> {
        if fields.is_empty() {
            return Ok(None);
        }
        let tokens = parse_field(fields, FIELD_TOKENS)?;
        let last_refill = parse_field(fields, FIELD_LAST_REFILL)?;
        Ok(Some(Self {
            tokens,
            last_refill,
        }))
    }

    pub fn to_fields(&self) -> HashFields {
        let mut fields = HashFields::new();
        fields.insert(FIELD_TOKENS.to_string(), self.tokens.to_string());
        fields.insert(FIELD_LAST_REFILL.to_string(), self.last_refill.to_string());
        fields
    }

    /// Add `floor(elapsed) * rate` tokens, capped at capacity
    ///
    /// A clock that moved backwards adds nothing.
    pub fn refilled(&self, now: i64, rate: i64, capacity: i64) -> Self {
        let elapsed = (now - self.last_refill).max(0);
        let refill = elapsed.saturating_mul(rate);
        Self {
            tokens: self.tokens.saturating_add(refill).min(capacity),
            last_refill: self.last_refill,
        }
    }

    /// Take one token, stamping the refill time; `None` when empty
    pub fn take(&self, now: i64) -> Option<Self> {
        if self.tokens < 1 {
            return None;
        }
        Some(Self {
            tokens: self.tokens - 1,
            last_refill: now,
        })
    }
}

fn parse_field(fields: &HashFields, name: &str) -> GatewayResult<i64> {
    let raw = fields.get(name).ok_or_else(|| {
        GatewayError::unavailable("rate_limiter", format!("bucket missing field '{}'", name))
    })?;
    raw.parse::<i64>().map_err(|_| {
        GatewayError::unavailable(
            "rate_limiter",
            format!("bucket field '{}' is not an integer: '{}'", name, raw),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refill_uses_whole_seconds_and_caps() {
        let bucket = TokenBucket {
            tokens: 0,
            last_refill: 100,
        };
        assert_eq!(bucket.refilled(100, 2, 10).tokens, 0);
        assert_eq!(bucket.refilled(103, 2, 10).tokens, 6);
        assert_eq!(bucket.refilled(200, 2, 10).tokens, 10);
        // Clock skew never removes tokens
        assert_eq!(bucket.refilled(50, 2, 10).tokens, 0);
    }

    #[test]
    fn take_stamps_time_and_refuses_when_empty() {
        let bucket = TokenBucket::full(1, 10);
        let after = bucket.take(12).unwrap();
        assert_eq!(after.tokens, 0);
        assert_eq!(after.last_refill, 12);
        assert!(after.take(12).is_none());
    }

    #[test]
    fn corrupt_fields_are_errors_not_denials() {
        let mut fields = HashFields::new();
        fields.insert(FIELD_TOKENS.to_string(), "many".to_string());
        fields.insert(FIELD_LAST_REFILL.to_string(), "0".to_string());
        assert!(TokenBucket::from_fields(&fields).is_err());
        assert_eq!(TokenBucket::from_fields(&HashFields::new()).unwrap(), None);
    }
}
