use colored::*;

/// Subsystem tag attached to every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Gateway,
    Session,
    Bus,
    Limiter,
    Breaker,
    Balancer,
    Rpc,
}

impl LogTag {
    /// Key matched against `--debug-<key>` flags
    pub fn to_debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Gateway => "gateway",
            LogTag::Session => "session",
            LogTag::Bus => "bus",
            LogTag::Limiter => "limiter",
            LogTag::Breaker => "breaker",
            LogTag::Balancer => "balancer",
            LogTag::Rpc => "rpc",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Gateway => "GATEWAY",
            LogTag::Session => "SESSION",
            LogTag::Bus => "BUS",
            LogTag::Limiter => "LIMITER",
            LogTag::Breaker => "BREAKER",
            LogTag::Balancer => "BALANCER",
            LogTag::Rpc => "RPC",
        }
    }

    pub(super) fn paint(&self, padded: String) -> ColoredString {
        match self {
            LogTag::System => padded.bright_yellow().bold(),
            LogTag::Config => padded.bright_white().bold(),
            LogTag::Gateway => padded.bright_green().bold(),
            LogTag::Session => padded.bright_cyan().bold(),
            LogTag::Bus => padded.bright_magenta().bold(),
            LogTag::Limiter => padded.bright_red().bold(),
            LogTag::Breaker => padded.red().bold(),
            LogTag::Balancer => padded.bright_blue().bold(),
            LogTag::Rpc => padded.cyan().bold(),
        }
    }
}
