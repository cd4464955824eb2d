//! Load-aware endpoint selection
//!
//! `LoadMonitor` keeps the last reported load per endpoint, `P2cSelector`
//! picks a replica from it, and `LoadReporter` feeds it over HTTP.

mod load_monitor;
mod p2c;
mod reporter;

pub use load_monitor::{LoadMonitor, LoadReport};
pub use p2c::{P2cSelector, DEFAULT_FORCED_SELECTION_INTERVAL};
pub use reporter::LoadReporter;
