//! Structured logging for the gateway
//!
//! Every line carries a subsystem tag and a level:
//!
//! ```rust,ignore
//! use im_gateway::logger::{self, LogTag};
//!
//! logger::info(LogTag::Gateway, "Listening on 0.0.0.0:8080");
//! logger::warning(LogTag::Bus, "Broker read failed, retrying in 2s");
//! logger::debug(LogTag::Limiter, "bucket rate_limit:global tokens=4"); // only with --debug-limiter
//! ```
//!
//! Call `logger::init()` once at startup, after arguments are available.

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger from command-line flags
pub fn init() {
    config::init_from_args();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level, shown only with `--debug-<tag>`
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level, shown only with `--verbose`
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}
