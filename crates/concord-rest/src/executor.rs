//! HTTP transport
//!
//! The executor performs exactly one HTTP call per invocation. It does not
//! interpret status codes, retry, or wait; all of that belongs to the rate
//! limiter above it. Tests substitute their own executor to script
//! responses without a network.

use crate::request::{RestRequest, RestResponse};
use async_trait::async_trait;
use concord_common::{ClientConfig, ClientError, ClientResult};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use tracing::warn;

const AUDIT_LOG_REASON: &str = "x-audit-log-reason";

/// One HTTP round trip, fake-able for tests
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Perform the request and return the raw response
    ///
    /// # Errors
    /// Returns a network error when the transport fails: connect errors,
    /// timeouts, dropped connections. HTTP error statuses are not errors
    /// at this layer.
    async fn execute(&self, request: &RestRequest) -> ClientResult<RestResponse>;
}

/// Production executor backed by a reqwest client
pub struct HttpExecutor {
    http: reqwest::Client,
    base_url: String,
}

impl HttpExecutor {
    /// Build an executor from the client configuration
    ///
    /// # Errors
    /// Returns an authentication error if the token cannot be used as a
    /// header value, or a network error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", config.token.trim()))
            .map_err(|_| {
                ClientError::authentication("token contains characters invalid in a header")
            })?;
        auth.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(AUTHORIZATION, auth);
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "DiscordBot (https://github.com/concord-rs/concord, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            )),
        );

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, request: &RestRequest) -> ClientResult<RestResponse> {
        let url = format!("{}{}", self.base_url, request.route.path());
        let mut builder = self.http.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(reason) = &request.reason {
            match HeaderValue::from_str(reason) {
                Ok(value) => builder = builder.header(AUDIT_LOG_REASON, value),
                Err(_) => warn!(%url, "dropping audit log reason with invalid characters"),
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::network(format!("{} {url}: {e}", request.method)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::network(format!("reading body of {url}: {e}")))?;

        Ok(RestResponse::new(status, headers, body))
    }
}
