/// Configuration loading
///
/// The loaded `Config` is handed to component constructors by value. Nothing
/// reads configuration through a global after startup.
use super::schemas::{Config, LOAD_CONFIG_BREAKER};
use crate::breaker::CircuitBreakers;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};
use std::path::Path;

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Parse and validate a TOML document
pub fn parse_config(contents: &str) -> GatewayResult<Config> {
    let config = toml::from_str::<Config>(contents)
        .map_err(|e| GatewayError::invalid(format!("Failed to parse config: {}", e)))?;
    config.validate().map_err(GatewayError::InvalidInput)?;
    Ok(config)
}

/// Load configuration from a TOML file
///
/// A missing file is not an error: defaults are used and a warning is logged.
pub async fn load_config_from_path(path: &str) -> GatewayResult<Config> {
    if !Path::new(path).exists() {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path),
        );
        return Ok(Config::default());
    }

    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        GatewayError::unavailable("config", format!("Failed to read '{}': {}", path, e))
    })?;

    let config = parse_config(&contents)?;
    logger::info(LogTag::Config, &format!("Loaded configuration from '{}'", path));
    Ok(config)
}

/// Load configuration through the `load_config` breaker
///
/// A tripped breaker or a slow read surfaces as `Unavailable` instead of
/// blocking startup.
pub async fn load_config_protected(breakers: &CircuitBreakers, path: &str) -> GatewayResult<Config> {
    let owned = path.to_string();
    breakers
        .protect(
            LOAD_CONFIG_BREAKER,
            || async move { load_config_from_path(&owned).await },
            |cause| async move {
                match cause {
                    GatewayError::InvalidInput(_) => Err(cause),
                    other => Err(GatewayError::unavailable("config", other)),
                }
            },
        )
        .await
}
