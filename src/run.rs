use std::sync::Arc;
use std::time::Duration;

use crate::{
    arguments,
    balancer::{LoadMonitor, P2cSelector},
    breaker::CircuitBreakers,
    bus,
    config::{self, Config},
    errors::GatewayResult,
    gateway::{AppState, ExternalServices},
    logger::{self, LogTag},
    rpc::HttpBackends,
    services::{
        implementations::{BusConsumerService, GatewayService, LoadReporterService},
        ServiceManager,
    },
    store,
};

/// Full gateway lifecycle: load config, build components, run services until Ctrl+C
pub async fn run_gateway() -> Result<(), String> {
    logger::info(LogTag::System, "IM gateway starting up...");

    // Breakers guard the config load itself, so they start from defaults
    let bootstrap_breakers = CircuitBreakers::new(Config::default().breakers);
    let config_path = arguments::config_path();
    let config = config::load_config_protected(&bootstrap_breakers, &config_path)
        .await
        .map_err(|e| format!("Failed to load config: {}", e))?;

    let breakers = Arc::new(CircuitBreakers::new(config.breakers.clone()));

    let store = store::connect(&config.store)
        .await
        .map_err(|e| format!("Failed to connect shared store: {}", e))?;

    let bus = bus::connect(&config.bus).map_err(|e| format!("Failed to connect bus: {}", e))?;
    logger::info(
        LogTag::Bus,
        &format!("Publishing through the {} bus", bus.publisher.backend_name()),
    );

    let monitor = Arc::new(LoadMonitor::new());
    let backends = build_backends(&config, monitor.clone())
        .map_err(|e| format!("Failed to build backend client: {}", e))?;

    let state = AppState::new(
        config.clone(),
        ExternalServices {
            store,
            backends: Arc::new(backends),
            publisher: bus.publisher,
            breakers,
            monitor,
        },
    )
    .map_err(|e| format!("Failed to build gateway state: {}", e))?;
    let state = Arc::new(state);

    let mut manager = ServiceManager::new(state.config.clone());
    manager.register(Box::new(BusConsumerService::new(
        bus.subscription,
        state.sessions.clone(),
        config.bus.clone(),
    )));
    manager.register(Box::new(GatewayService::new(state.clone())));
    manager.register(Box::new(LoadReporterService::new(&config)));

    if let Err(e) = manager.start_all().await {
        let _ = manager.stop_all().await;
        return Err(format!("Failed to start services: {}", e));
    }

    logger::info(
        LogTag::System,
        &format!(
            "Gateway running on {} (Ctrl+C to stop)",
            config.server.bind_address()
        ),
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {}", e))?;

    logger::info(LogTag::System, "Shutdown signal received");
    for (name, health) in manager.get_health().await {
        logger::debug(LogTag::System, &format!("{} at shutdown: {}", name, health));
    }
    manager
        .stop_all()
        .await
        .map_err(|e| format!("Failed to stop services: {}", e))?;

    logger::info(LogTag::System, "IM gateway stopped");
    Ok(())
}

/// Backend client whose single P2C selector reads the monitor fed by `/report_load`
fn build_backends(config: &Config, monitor: Arc<LoadMonitor>) -> GatewayResult<HttpBackends> {
    let selector = Arc::new(P2cSelector::with_interval(
        monitor,
        Duration::from_secs(config.load_monitor.forced_selection_interval_secs),
    ));
    HttpBackends::new(selector, config.rpc.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_select_by_reported_load() {
        let monitor = Arc::new(LoadMonitor::new());
        let backends = build_backends(&Config::default(), monitor.clone()).unwrap();
        assert!(Arc::ptr_eq(backends.selector().monitor(), &monitor));

        monitor.report_load("10.0.0.1:50052", 90);
        monitor.report_load("10.0.0.2:50052", 10);
        let endpoints = vec!["10.0.0.1:50052".to_string(), "10.0.0.2:50052".to_string()];
        // The first selection is a full sweep
        assert_eq!(backends.selector().select(&endpoints).unwrap(), "10.0.0.2:50052");
    }
}
