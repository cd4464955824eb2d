//! Client-facing gateway
//!
//! An axum server exposing `/ws` (rate limited and auth gated), `POST
//! /report_load` and `/health`. Each WebSocket connection runs its own task
//! that parses client commands, dispatches them to the backends and pushes
//! frames queued by the bus consumer.

pub mod command;
pub mod connection;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use command::ClientCommand;
pub use routes::build_router;
pub use server::{serve, start_server};
pub use state::{AppState, ExternalServices};
