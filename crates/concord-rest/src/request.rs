//! Request and response envelopes

use crate::headers::{retry_after_from_body, RateLimitHeaders};
use crate::routes::{RestRoute, RouteKey};
use concord_common::{ClientError, ClientResult};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// One REST request, before rate limiting and transport
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub route: RestRoute,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Value for the audit log reason header, when the endpoint records one
    pub reason: Option<String>,
}

impl RestRequest {
    #[must_use]
    pub fn new(method: Method, route: RestRoute) -> Self {
        Self {
            method,
            route,
            query: Vec::new(),
            body: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn get(route: RestRoute) -> Self {
        Self::new(Method::GET, route)
    }

    #[must_use]
    pub fn post(route: RestRoute) -> Self {
        Self::new(Method::POST, route)
    }

    #[must_use]
    pub fn patch(route: RestRoute) -> Self {
        Self::new(Method::PATCH, route)
    }

    #[must_use]
    pub fn delete(route: RestRoute) -> Self {
        Self::new(Method::DELETE, route)
    }

    #[must_use]
    pub fn put(route: RestRoute) -> Self {
        Self::new(Method::PUT, route)
    }

    /// Append a query string parameter
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body
    #[must_use]
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach an audit log reason
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The rate limit queue this request belongs to
    #[must_use]
    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.method.clone(), &self.route)
    }
}

/// One REST response, as returned by the transport
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RestResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    /// Returns a protocol error if the body does not parse as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ClientError::protocol(format!("malformed response body ({}): {e}", self.status))
        })
    }

    /// Rate limit metadata carried by this response
    #[must_use]
    pub fn ratelimit(&self) -> RateLimitHeaders {
        RateLimitHeaders::parse(&self.headers)
    }

    /// How long a 429 asks us to wait, preferring the body's fractional
    /// value over the integral header
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        retry_after_from_body(&self.body).or_else(|| self.ratelimit().retry_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::Snowflake;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_builder() {
        let request = RestRequest::post(RestRoute::ChannelMessages {
            channel_id: Snowflake::new(1),
        })
        .body(serde_json::json!({"content": "hi"}))
        .query("limit", "50")
        .reason("test");

        assert_eq!(request.method, Method::POST);
        assert!(request.body.is_some());
        assert_eq!(request.query.len(), 1);
        assert_eq!(request.reason.as_deref(), Some("test"));
    }

    #[test]
    fn test_json_parse_failure_is_protocol_error() {
        let response = RestResponse::new(StatusCode::OK, HeaderMap::new(), "not json".to_string());
        let result: ClientResult<serde_json::Value> = response.json();
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }

    #[test]
    fn test_retry_after_prefers_body() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        let response = RestResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            r#"{"retry_after": 1.5}"#.to_string(),
        );
        assert_eq!(response.retry_after(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_retry_after_falls_back_to_header() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        let response =
            RestResponse::new(StatusCode::TOO_MANY_REQUESTS, headers, String::new());
        assert_eq!(response.retry_after(), Some(Duration::from_secs(3)));
    }
}
