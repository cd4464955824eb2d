/// Backend RPC surface used by the gateway
///
/// Workers expose JSON-over-HTTP endpoints (`/user/register`, `/user/login`,
/// `/message/send`, `/friend/list`). Every call picks a replica of the owning
/// service with the P2C selector, dials it under the configured deadline and
/// forwards the client's bearer token unchanged.
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::dial::dial_endpoint;
use super::types::{
    BackendService, FriendListReply, FriendListRequest, LoginRequest, RegisterRequest, RpcReply,
    SendMessageRequest,
};
use crate::balancer::P2cSelector;
use crate::config::RpcConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::logger::{self, LogTag};

#[async_trait]
pub trait Backends: Send + Sync {
    async fn register(
        &self,
        token: &str,
        username: &str,
        password: &str,
        nickname: &str,
    ) -> GatewayResult<RpcReply>;

    async fn login(&self, token: &str, username: &str, password: &str) -> GatewayResult<RpcReply>;

    async fn send_message(
        &self,
        token: &str,
        from: &str,
        to: &str,
        content: &str,
    ) -> GatewayResult<RpcReply>;

    async fn get_friend_list(&self, token: &str, username: &str) -> GatewayResult<Vec<String>>;
}

pub struct HttpBackends {
    client: reqwest::Client,
    selector: Arc<P2cSelector>,
    config: RpcConfig,
}

impl HttpBackends {
    pub fn new(selector: Arc<P2cSelector>, config: RpcConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.dial_timeout())
            .build()
            .map_err(|e| GatewayError::Fatal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            selector,
            config,
        })
    }

    /// Selector shared with the `/report_load` monitor
    pub fn selector(&self) -> &Arc<P2cSelector> {
        &self.selector
    }

    fn endpoints(&self, service: BackendService) -> &[String] {
        match service {
            BackendService::User => &self.config.user_endpoints,
            BackendService::Message => &self.config.message_endpoints,
            BackendService::Friend => &self.config.friend_endpoints,
        }
    }

    async fn call<Req, Resp>(
        &self,
        service: BackendService,
        path: &str,
        token: &str,
        body: &Req,
    ) -> GatewayResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let timeout: Duration = self.config.dial_timeout();
        let endpoint = dial_endpoint(&self.selector, self.endpoints(service), timeout).await?;
        let url = format!("http://{}{}", endpoint, path);
        logger::debug(LogTag::Rpc, &format!("{} -> {}", service.as_str(), url));

        let response = self
            .client
            .post(&url)
            .header("Authorization", token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::timeout(format!("{} {}", service.as_str(), path), timeout)
                } else {
                    GatewayError::unavailable(service.as_str(), e)
                }
            })?;

        match response.status() {
            status if status.is_success() => response
                .json::<Resp>()
                .await
                .map_err(|e| GatewayError::unavailable(service.as_str(), format!("bad reply: {}", e))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized(
                format!("{} rejected the token", service.as_str()),
            )),
            StatusCode::BAD_REQUEST => {
                let text = response.text().await.unwrap_or_default();
                Err(GatewayError::invalid(text))
            }
            status => Err(GatewayError::unavailable(
                service.as_str(),
                format!("HTTP {}", status),
            )),
        }
    }
}

#[async_trait]
impl Backends for HttpBackends {
    async fn register(
        &self,
        token: &str,
        username: &str,
        password: &str,
        nickname: &str,
    ) -> GatewayResult<RpcReply> {
        let request = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            nickname: nickname.to_string(),
        };
        self.call(BackendService::User, "/user/register", token, &request)
            .await
    }

    async fn login(&self, token: &str, username: &str, password: &str) -> GatewayResult<RpcReply> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.call(BackendService::User, "/user/login", token, &request)
            .await
    }

    async fn send_message(
        &self,
        token: &str,
        from: &str,
        to: &str,
        content: &str,
    ) -> GatewayResult<RpcReply> {
        let request = SendMessageRequest {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
        };
        self.call(BackendService::Message, "/message/send", token, &request)
            .await
    }

    async fn get_friend_list(&self, token: &str, username: &str) -> GatewayResult<Vec<String>> {
        let request = FriendListRequest {
            username: username.to_string(),
        };
        let reply: FriendListReply = self
            .call(BackendService::Friend, "/friend/list", token, &request)
            .await?;
        Ok(reply.friends)
    }
}
