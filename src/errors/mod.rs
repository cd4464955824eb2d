/// Structured error handling for the gateway
///
/// Every fallible operation in the crate returns `GatewayResult<T>`. The variants
/// separate policy outcomes (`Denied`, `Unauthorized`) from faults (`Unavailable`,
/// `Timeout`, `Fatal`) so callers can answer clients with distinct signals.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {service}: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("Rate limited: {scope}")]
    Denied { scope: String },

    #[error("Unauthenticated: {0}")]
    Unauthorized(String),

    #[error("Timeout: {operation} exceeded {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("Fatal: {0}")]
    Fatal(String),
}

impl GatewayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        GatewayError::InvalidInput(message.into())
    }

    pub fn unavailable(service: impl Into<String>, reason: impl ToString) -> Self {
        GatewayError::Unavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        GatewayError::Timeout {
            operation: operation.into(),
            millis: duration.as_millis() as u64,
        }
    }

    /// Faults worth retrying at a higher level (the caller decides whether to)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GatewayError::Unavailable { .. } | GatewayError::Timeout { .. }
        )
    }

    /// Policy outcomes rather than faults
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            GatewayError::Denied { .. } | GatewayError::Unauthorized(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Fatal(_))
    }

    /// Short machine-readable code used in client frames and HTTP bodies
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidInput(_) => "INVALID_INPUT",
            GatewayError::Unavailable { .. } => "UNAVAILABLE",
            GatewayError::Denied { .. } => "RATE_LIMITED",
            GatewayError::Unauthorized(_) => "UNAUTHENTICATED",
            GatewayError::Timeout { .. } => "TIMEOUT",
            GatewayError::Fatal(_) => "FATAL",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::unavailable("io", e)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidInput(format!("json: {}", e))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for GatewayError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout {
                operation: "redis".to_string(),
                millis: 0,
            }
        } else {
            GatewayError::unavailable("redis", e)
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
