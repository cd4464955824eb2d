mod bus_consumer_service;
mod gateway_service;
mod load_reporter_service;

pub use bus_consumer_service::BusConsumerService;
pub use gateway_service::GatewayService;
pub use load_reporter_service::LoadReporterService;
