use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::PresenceError;
use super::model::{ChatId, UserId, UserStatus};
use super::store::{Beacon, StatusStore};
use crate::utils::{ApiResponse, error_codes};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OnlineStatusBody {
    is_online: bool,
}

/// 通过 HTTP 接口访问状态存储
#[derive(Clone)]
pub struct HttpStatusStore {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpStatusStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn online_status_request(&self, is_online: bool) -> RequestBuilder {
        self.client
            .post(self.url("/status/online"))
            .bearer_auth(&self.token)
            .json(&OnlineStatusBody { is_online })
    }

    async fn send<T: DeserializeOwned>(
        request: RequestBuilder,
    ) -> Result<Option<T>, PresenceError> {
        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(PresenceError::Unauthenticated);
        }

        let status = response.status();
        let body: ApiResponse<T> = response.json().await?;
        if body.code != error_codes::SUCCESS {
            tracing::debug!("Status API returned {} ({}): {}", status, body.code, body.msg);
            return Err(PresenceError::Api {
                code: body.code,
                message: body.msg,
            });
        }

        Ok(body.resp_data)
    }
}

#[async_trait]
impl StatusStore for HttpStatusStore {
    async fn update_online_status(&self, is_online: bool) -> Result<(), PresenceError> {
        Self::send::<UserStatus>(self.online_status_request(is_online)).await?;
        Ok(())
    }

    async fn get_user_status(&self, user_id: UserId) -> Result<Option<UserStatus>, PresenceError> {
        let request = self
            .client
            .get(self.url(&format!("/status/users/{}", user_id)))
            .bearer_auth(&self.token);
        Self::send(request).await
    }

    async fn get_chat_users_status(
        &self,
        chat_id: ChatId,
    ) -> Result<Vec<UserStatus>, PresenceError> {
        let request = self
            .client
            .get(self.url(&format!("/status/chats/{}", chat_id)))
            .bearer_auth(&self.token);
        Ok(Self::send(request).await?.unwrap_or_default())
    }
}

impl Beacon for HttpStatusStore {
    fn send_online_status(&self, is_online: bool) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available, dropping online status beacon");
            return;
        };

        let request = self.online_status_request(is_online);
        // 结果直接丢弃，不等待也不重试
        runtime.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!("Online status beacon failed: {}", e);
            }
        });
    }
}
