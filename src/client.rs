//! HTTP client adapter for the SendGrid v3 API.
//!
//! A thin wrapper over `reqwest` that handles bearer-token auth, the JSON
//! error envelope, and offset pagination. Status codes are mapped into the
//! provider error taxonomy here so that callers never look at raw HTTP:
//!
//! - connection failures, 408, 429 and 5xx -> [`ProviderError::Transient`]
//! - 404 -> [`ProviderError::NotFound`]
//! - other 4xx -> [`ProviderError::RemoteRejected`]

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::ProviderError;

/// The default SendGrid API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An authenticated client for the SendGrid v3 API.
#[derive(Debug, Clone)]
pub struct SendGridClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

/// One entry of SendGrid's `{"errors": [...]}` envelope.
#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    field: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

impl SendGridClient {
    /// Create a new client. `base_url` falls back to [`DEFAULT_BASE_URL`]
    /// when empty (the EU endpoint can be supplied for regional accounts).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let base_url = {
            let raw = base_url.into();
            if raw.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                raw.trim_end_matches('/').to_string()
            }
        };
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url,
            http,
        })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Percent-encode a value used as a single path segment (pool names and
    /// suppression emails can contain reserved characters).
    pub fn encode_path_segment(segment: &str) -> String {
        let mut url = Url::parse("https://sendgrid.invalid").expect("static URL parses");
        url.path_segments_mut()
            .expect("https URLs have path segments")
            .push(segment);
        url.path().trim_start_matches('/').to_string()
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path, "SendGrid API request");

        let mut req = self
            .http
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(None);
            }
            let value: Value = serde_json::from_slice(&bytes)?;
            return Ok(Some(value));
        }

        Err(Self::map_error(status, &bytes))
    }

    fn map_error(status: StatusCode, body: &[u8]) -> ProviderError {
        let (message, field) = match serde_json::from_slice::<ApiErrorEnvelope>(body) {
            Ok(envelope) if !envelope.errors.is_empty() => {
                let first = &envelope.errors[0];
                (first.message.clone(), first.field.clone())
            },
            _ => (
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
                None,
            ),
        };

        if status == StatusCode::NOT_FOUND {
            return ProviderError::NotFound(message);
        }
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            return ProviderError::Transient(format!(
                "SendGrid API status {}: {}",
                status.as_u16(),
                message
            ));
        }

        ProviderError::RemoteRejected {
            status: status.as_u16(),
            message,
            field,
        }
    }

    /// Perform a GET request and decode the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let value = self
            .request(Method::GET, path, None)
            .await?
            .unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Perform a POST request and decode the JSON response.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, ProviderError> {
        let value = self
            .request(Method::POST, path, Some(body))
            .await?
            .unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Perform a PUT request and decode the JSON response.
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, ProviderError> {
        let value = self
            .request(Method::PUT, path, Some(body))
            .await?
            .unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Perform a PATCH request and decode the JSON response.
    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, ProviderError> {
        let value = self
            .request(Method::PATCH, path, Some(body))
            .await?
            .unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Perform a DELETE request, discarding any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.request(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Fetch every page of a list endpoint that supports `limit`/`offset`
    /// query parameters. Accepts both bare-array responses and SendGrid's
    /// `{"result": [...]}` / `{"results": [...]}` wrappers.
    pub async fn get_paged(&self, path: &str, page_size: usize) -> Result<Vec<Value>, ProviderError> {
        let mut items = Vec::new();
        let mut offset = 0usize;
        let sep = if path.contains('?') { '&' } else { '?' };

        loop {
            let page_path = format!("{}{}limit={}&offset={}", path, sep, page_size, offset);
            let value: Value = self.get(&page_path).await?;
            let page = match value {
                Value::Array(arr) => arr,
                Value::Object(mut obj) => match obj.remove("result").or_else(|| obj.remove("results")) {
                    Some(Value::Array(arr)) => arr,
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };

            let count = page.len();
            items.extend(page);
            if count < page_size {
                break;
            }
            offset += count;
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_defaulting() {
        let client = SendGridClient::new("SG.key", "").unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);

        let client = SendGridClient::new("SG.key", "https://api.eu.sendgrid.com/").unwrap();
        assert_eq!(client.base_url(), "https://api.eu.sendgrid.com");
    }

    #[test]
    fn test_encode_path_segment() {
        // `@` is legal inside a path segment and stays bare.
        assert_eq!(
            SendGridClient::encode_path_segment("user@example.com"),
            "user@example.com"
        );
        assert_eq!(
            SendGridClient::encode_path_segment("marketing pool"),
            "marketing%20pool"
        );
        assert_eq!(SendGridClient::encode_path_segment("plain"), "plain");
    }

    #[test]
    fn test_map_error_taxonomy() {
        let body = serde_json::to_vec(&json!({
            "errors": [{"message": "invalid scope", "field": "scopes"}]
        }))
        .unwrap();

        let err = SendGridClient::map_error(StatusCode::BAD_REQUEST, &body);
        match err {
            ProviderError::RemoteRejected {
                status,
                message,
                field,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid scope");
                assert_eq!(field.as_deref(), Some("scopes"));
            },
            other => panic!("expected RemoteRejected, got {:?}", other),
        }

        let err = SendGridClient::map_error(StatusCode::NOT_FOUND, b"");
        assert!(err.is_not_found());

        let err = SendGridClient::map_error(StatusCode::SERVICE_UNAVAILABLE, b"");
        assert!(err.is_retryable());

        let err = SendGridClient::map_error(StatusCode::TOO_MANY_REQUESTS, b"");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_map_error_without_envelope() {
        let err = SendGridClient::map_error(StatusCode::FORBIDDEN, b"not json");
        match err {
            ProviderError::RemoteRejected { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden");
            },
            other => panic!("expected RemoteRejected, got {:?}", other),
        }
    }
}
