use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;

/// Runtime logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Most detailed level shown (debug still needs a per-tag flag)
    pub min_level: LogLevel,
    /// Tags with `--debug-<tag>` enabled
    pub debug_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Debug,
            debug_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

/// Build the logger configuration from `--debug-*`, `--verbose` and `--quiet`
pub fn init_from_args() {
    let min_level = if arguments::is_quiet_enabled() {
        LogLevel::Warning
    } else if arguments::is_verbose_enabled() {
        LogLevel::Verbose
    } else {
        LogLevel::Debug
    };

    set_logger_config(LoggerConfig {
        min_level,
        debug_tags: arguments::debug_modules().into_iter().collect(),
    });
}

pub(super) fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read();
    config.min_level == LogLevel::Verbose || config.debug_tags.contains(tag.to_debug_key())
}
