//! Circuit breakers
//!
//! `protect(name, operation, fallback)` runs an async operation with a timeout
//! and a concurrency cap. The breaker opens when the rolling error rate reaches
//! the threshold (once enough calls were seen), short-circuits to the fallback
//! during the cooldown, then lets a single trial call decide whether to close.

mod registry;
mod state;
mod window;

pub use registry::CircuitBreakers;
pub use state::{BreakerStatus, CircuitBreaker, CircuitState};
