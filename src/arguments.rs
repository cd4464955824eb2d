/// Centralized argument handling for the gateway binaries
///
/// Arguments are captured once into `CMD_ARGS`. Tests and tool binaries can
/// override them with `set_cmd_args`. Debug flags follow the `--debug-<module>`
/// convention and are consumed by the logger.
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::env;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "data/config.toml";

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
pub fn set_cmd_args(args: Vec<String>) {
    *CMD_ARGS.lock() = args;
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    CMD_ARGS.lock().clone()
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

/// All `--debug-<module>` keys present on the command line
pub fn debug_modules() -> Vec<String> {
    get_cmd_args()
        .iter()
        .filter_map(|a| a.strip_prefix("--debug-").map(|m| m.to_string()))
        .collect()
}

pub fn is_verbose_enabled() -> bool {
    has_arg("--verbose")
}

pub fn is_quiet_enabled() -> bool {
    has_arg("--quiet")
}

pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

/// Config file path from `--config <path>`, falling back to the default
pub fn config_path() -> String {
    get_arg_value("--config").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

pub fn print_help() {
    println!("im-gateway - real-time delivery and traffic control for IM backends");
    println!();
    println!("USAGE:");
    println!("    im-gateway [--config <path>] [--debug-<module>]... [--verbose|--quiet]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>     TOML configuration file (default: {})", DEFAULT_CONFIG_PATH);
    println!("    --debug-<module>    Enable debug logs for a module:");
    println!("                        gateway, session, bus, limiter, breaker, balancer, rpc, config");
    println!("    --verbose           Enable verbose logs for every module");
    println!("    --quiet             Only show warnings and errors");
    println!("    -h, --help          Print this help");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_parsing() {
        set_cmd_args(vec![
            "im-gateway".to_string(),
            "--config".to_string(),
            "etc/gateway.toml".to_string(),
            "--debug-bus".to_string(),
            "--debug-limiter".to_string(),
        ]);

        assert_eq!(config_path(), "etc/gateway.toml");
        assert!(has_arg("--debug-bus"));
        assert_eq!(debug_modules(), vec!["bus".to_string(), "limiter".to_string()]);
        assert_eq!(get_arg_value("--debug-limiter"), None);
        assert!(!is_help_requested());
    }
}
