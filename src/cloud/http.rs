//! HTTP utilities for Huawei Cloud REST API calls

use super::error::{sanitize_for_log, CloudError, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

/// Header carrying the IAM token on every service request
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Default request timeout when the configuration does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client wrapper for service API calls
#[derive(Clone)]
pub struct HwHttpClient {
    client: Client,
}

impl std::fmt::Debug for HwHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HwHttpClient")
    }
}

impl HwHttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("hwcloud-provider/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    /// Underlying reqwest client, for calls that need response headers
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        self.request(Method::GET, url, token, None).await
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::POST, url, token, body).await
    }

    /// Make a PUT request
    pub async fn put(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::PUT, url, token, body).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str, token: &str) -> Result<Value> {
        self.request(Method::DELETE, url, token, None).await
    }

    /// Send a request and parse the JSON response.
    /// Empty bodies come back as `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(AUTH_TOKEN_HEADER, token);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!(
                "API error: {} {} -> {} - {}",
                method,
                url,
                status,
                sanitize_for_log(&response_body)
            );
            return Err(CloudError::from_response(status.as_u16(), &response_body));
        }

        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&response_body)?)
    }
}
