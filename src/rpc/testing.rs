//! In-memory backends for tests and local runs
//!
//! Keeps users, friendships and sent messages in maps so the gateway can be
//! exercised without any worker processes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::backends::Backends;
use super::types::RpcReply;
use crate::errors::{GatewayError, GatewayResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: String,
    pub to: String,
    pub content: String,
}

#[derive(Default)]
pub struct MockBackends {
    users: Mutex<HashMap<String, (String, String)>>,
    friends: Mutex<HashMap<String, Vec<String>>>,
    sent: Mutex<Vec<SentMessage>>,
    register_calls: AtomicU32,
    fail_sends: AtomicBool,
    reject_sends: AtomicBool,
}

impl MockBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: &str, password: &str) {
        self.users
            .lock()
            .insert(username.to_string(), (password.to_string(), username.to_string()));
    }

    pub fn add_friend(&self, username: &str, friend: &str) {
        self.friends
            .lock()
            .entry(username.to_string())
            .or_default()
            .push(friend.to_string());
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn register_calls(&self) -> u32 {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Make every following `send_message` fail as unavailable
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every following `send_message` answer `success: false` without storing
    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }
}

fn reply(message: impl Into<String>) -> RpcReply {
    RpcReply {
        success: true,
        message: message.into(),
    }
}

#[async_trait]
impl Backends for MockBackends {
    async fn register(
        &self,
        _token: &str,
        username: &str,
        password: &str,
        nickname: &str,
    ) -> GatewayResult<RpcReply> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.lock();
        if users.contains_key(username) {
            return Err(GatewayError::invalid(format!("user {} already exists", username)));
        }
        users.insert(
            username.to_string(),
            (password.to_string(), nickname.to_string()),
        );
        Ok(reply(format!("registered {}", username)))
    }

    async fn login(&self, _token: &str, username: &str, password: &str) -> GatewayResult<RpcReply> {
        match self.users.lock().get(username) {
            Some((stored, _)) if stored == password => Ok(reply(format!("welcome {}", username))),
            _ => Err(GatewayError::Unauthorized("bad username or password".to_string())),
        }
    }

    async fn send_message(
        &self,
        _token: &str,
        from: &str,
        to: &str,
        content: &str,
    ) -> GatewayResult<RpcReply> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::unavailable("message", "worker down"));
        }
        if self.reject_sends.load(Ordering::SeqCst) {
            return Ok(RpcReply {
                success: false,
                message: format!("{} and {} are not friends", from, to),
            });
        }
        self.sent.lock().push(SentMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
        });
        Ok(reply("stored"))
    }

    async fn get_friend_list(&self, _token: &str, username: &str) -> GatewayResult<Vec<String>> {
        Ok(self
            .friends
            .lock()
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}
