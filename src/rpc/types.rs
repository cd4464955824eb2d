use serde::{Deserialize, Serialize};

/// Backend services the gateway dials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendService {
    User,
    Message,
    Friend,
}

impl BackendService {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendService::User => "user",
            BackendService::Message => "message",
            BackendService::Friend => "friend",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub from: String,
    pub to: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendListRequest {
    pub username: String,
}

/// Generic worker reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FriendListReply {
    #[serde(default)]
    pub friends: Vec<String>,
}
