//! Backend RPC
//!
//! - `dial`: P2C endpoint choice plus a deadline-bound connect
//! - `backends`: the `Backends` trait and its HTTP implementation
//! - `testing`: in-memory `MockBackends`
//! - `types`: request and reply bodies

pub mod backends;
pub mod dial;
pub mod testing;
pub mod types;

pub use backends::{Backends, HttpBackends};
pub use dial::dial_endpoint;
pub use testing::MockBackends;
pub use types::{BackendService, RpcReply};
