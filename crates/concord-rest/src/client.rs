//! High level REST client
//!
//! Thin facade over the rate limiter. Entity payloads stay as raw JSON
//! values; interpreting them is the caller's business.

use crate::executor::{HttpExecutor, RequestExecutor};
use crate::limiter::RateLimiter;
use crate::request::{RestRequest, RestResponse};
use crate::routes::RestRoute;
use concord_common::{ClientConfig, ClientError, ClientResult};
use concord_core::Snowflake;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Rate-limited REST client
#[derive(Clone)]
pub struct RestClient {
    limiter: RateLimiter,
}

impl RestClient {
    /// Build a client speaking real HTTP
    ///
    /// # Errors
    /// Fails when the token is unusable or the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let executor = Arc::new(HttpExecutor::new(config)?);
        Ok(Self::with_executor(executor, config))
    }

    /// Build a client on top of a custom transport
    #[must_use]
    pub fn with_executor(executor: Arc<dyn RequestExecutor>, config: &ClientConfig) -> Self {
        Self {
            limiter: RateLimiter::new(
                executor,
                config.api.max_attempts,
                config.api.global_requests_per_second,
            ),
        }
    }

    /// Send a request through the rate limiter
    ///
    /// # Errors
    /// See [`ClientError`]. Responses with 4xx statuses other than 401
    /// and 429 are returned as values for the caller to inspect.
    pub async fn request(&self, request: RestRequest) -> ClientResult<RestResponse> {
        self.limiter.submit(request).await
    }

    /// Fetch the gateway connection advice for this bot
    ///
    /// # Errors
    /// Returns a protocol error when the endpoint answers with anything
    /// but a well-formed success response.
    pub async fn get_gateway_bot(&self) -> ClientResult<GatewayInfo> {
        let response = self.request(RestRequest::get(RestRoute::GatewayBot)).await?;
        if !response.status.is_success() {
            return Err(ClientError::protocol(format!(
                "gateway bootstrap returned status {}",
                response.status
            )));
        }
        let info: GatewayInfo = response.json()?;
        debug!(
            url = %info.url,
            shards = info.shards,
            remaining_starts = info.session_start_limit.remaining,
            max_concurrency = info.session_start_limit.max_concurrency,
            "fetched gateway connection advice"
        );
        Ok(info)
    }

    /// Post a message to a channel, returning the created entity as JSON
    ///
    /// # Errors
    /// See [`ClientError`].
    pub async fn create_message(
        &self,
        channel_id: Snowflake,
        content: impl Into<String>,
    ) -> ClientResult<serde_json::Value> {
        let request = RestRequest::post(RestRoute::ChannelMessages { channel_id })
            .body(serde_json::json!({ "content": content.into() }));
        self.request(request).await?.json()
    }

    /// Show the typing indicator in a channel
    ///
    /// # Errors
    /// See [`ClientError`].
    pub async fn trigger_typing(&self, channel_id: Snowflake) -> ClientResult<()> {
        self.request(RestRequest::post(RestRoute::ChannelTyping { channel_id }))
            .await?;
        Ok(())
    }

    /// Fetch the bot's own user entity as JSON
    ///
    /// # Errors
    /// See [`ClientError`].
    pub async fn get_current_user(&self) -> ClientResult<serde_json::Value> {
        self.request(RestRequest::get(RestRoute::CurrentUser))
            .await?
            .json()
    }

    /// Stop accepting requests and fail everything queued
    pub fn shutdown(&self) {
        self.limiter.shutdown();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.limiter.is_shutdown()
    }
}

/// Connection advice returned by the gateway bootstrap endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInfo {
    /// Websocket URL to connect to
    pub url: String,
    /// Recommended shard count for this bot
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// How many fresh gateway sessions the bot may still start
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until `remaining` resets
    pub reset_after: u64,
    /// How many shards may identify within one rate limit window
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    struct StaticExecutor {
        status: StatusCode,
        body: String,
    }

    #[async_trait]
    impl RequestExecutor for StaticExecutor {
        async fn execute(&self, _request: &RestRequest) -> ClientResult<RestResponse> {
            Ok(RestResponse::new(
                self.status,
                HeaderMap::new(),
                self.body.clone(),
            ))
        }
    }

    fn client_with(status: StatusCode, body: &str) -> RestClient {
        let executor = Arc::new(StaticExecutor {
            status,
            body: body.to_string(),
        });
        RestClient::with_executor(executor, &ClientConfig::new("token"))
    }

    #[test]
    fn test_gateway_info_deserializes() {
        let json = r#"{
            "url": "wss://gateway.example.com",
            "shards": 2,
            "session_start_limit": {
                "total": 1000,
                "remaining": 997,
                "reset_after": 14400000,
                "max_concurrency": 1
            }
        }"#;
        let info: GatewayInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.url, "wss://gateway.example.com");
        assert_eq!(info.shards, 2);
        assert_eq!(info.session_start_limit.remaining, 997);
        assert_eq!(info.session_start_limit.max_concurrency, 1);
    }

    #[test]
    fn test_max_concurrency_defaults_to_one() {
        let json = r#"{"total": 1000, "remaining": 999, "reset_after": 0}"#;
        let limit: SessionStartLimit = serde_json::from_str(json).unwrap();
        assert_eq!(limit.max_concurrency, 1);
    }

    #[tokio::test]
    async fn test_get_gateway_bot_parses_response() {
        let client = client_with(
            StatusCode::OK,
            r#"{"url": "wss://gw", "shards": 1, "session_start_limit":
                {"total": 1000, "remaining": 1000, "reset_after": 0, "max_concurrency": 1}}"#,
        );
        let info = client.get_gateway_bot().await.unwrap();
        assert_eq!(info.url, "wss://gw");
        assert_eq!(info.shards, 1);
    }

    #[tokio::test]
    async fn test_get_gateway_bot_rejects_error_status() {
        let client = client_with(StatusCode::NOT_FOUND, "{}");
        let result = client.get_gateway_bot().await;
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_requests() {
        let client = client_with(StatusCode::OK, "{}");
        client.shutdown();
        let result = client.get_current_user().await;
        assert!(matches!(result, Err(ClientError::ShuttingDown)));
    }
}
