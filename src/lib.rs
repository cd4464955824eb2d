pub mod arguments;
pub mod balancer;
pub mod breaker;
pub mod bus;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod idempotency;
pub mod limiter;
pub mod logger;
pub mod rpc;
pub mod run;
pub mod services;
pub mod session;
pub mod store;
