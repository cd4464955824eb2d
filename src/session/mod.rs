//! Sessions: who is connected, and keeping connections alive
//!
//! - `registry`: username to live connection, plus per-user listener queues
//! - `heartbeat`: liveness tracking shared by both ends
//! - `reconnect`: transport abstraction and bounded redial
//! - `client`: heartbeat sender and receive loop for a client connection

pub mod client;
pub mod heartbeat;
pub mod reconnect;
pub mod registry;

pub use client::ClientSession;
pub use heartbeat::{is_heartbeat, HeartbeatConfig, Liveness, HEARTBEAT_FRAME};
pub use reconnect::{reconnect, Dialer, FrameSink, FrameSource, ReconnectPolicy, Transport, WsDialer};
pub use registry::{
    ConnectionId, DeliveryReport, ListenerEvent, PushOutcome, SessionHandle, SessionRegistry,
};
