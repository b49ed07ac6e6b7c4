//! Service Client
//!
//! A client bound to one service in one region: endpoint, project ID and
//! credentials, combined with the HTTP layer.

use super::auth::Credentials;
use super::error::Result;
use super::http::HwHttpClient;
use reqwest::Method;
use serde_json::Value;

/// Client for one service in one region
#[derive(Clone, Debug)]
pub struct ServiceClient {
    pub http: HwHttpClient,
    pub credentials: Credentials,
    pub service: String,
    pub region: String,
    pub project_id: String,
    /// Base endpoint, always ending with `/`
    pub endpoint: String,
}

impl ServiceClient {
    pub fn new(
        http: HwHttpClient,
        credentials: Credentials,
        service: &str,
        region: &str,
        project_id: &str,
        endpoint: &str,
    ) -> Self {
        let mut endpoint = endpoint.to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        Self {
            http,
            credentials,
            service: service.to_string(),
            region: region.to_string(),
            project_id: project_id.to_string(),
            endpoint,
        }
    }

    /// Get the current access token for this client's region
    pub async fn get_token(&self) -> Result<String> {
        Ok(self.credentials.get_token(&self.region).await?.token)
    }

    /// Build a request URL from a path template such as
    /// `v3/{project_id}/elb/listeners/{listener_id}`.
    /// `{project_id}` comes from the client; other placeholders from `params`.
    pub fn url_for(&self, template: &str, params: &[(&str, &str)]) -> String {
        let mut path = template
            .trim_start_matches('/')
            .replace("{project_id}", &self.project_id);

        for (name, value) in params {
            path = path.replace(&format!("{{{}}}", name), &urlencoding::encode(value));
        }

        format!("{}{}", self.endpoint, path)
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.post(url, &token, body).await
    }

    /// Make a PUT request
    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.put(url, &token, body).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    /// Make a request with an arbitrary method
    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.request(method, url, &token, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::auth::TokenSource;
    use std::time::Duration;

    fn client(endpoint: &str) -> ServiceClient {
        let http = HwHttpClient::new(Duration::from_secs(5)).unwrap();
        let credentials = Credentials::new(
            TokenSource::Static("token".to_string()),
            http.inner().clone(),
        );
        ServiceClient::new(http, credentials, "eg", "cn-north-4", "proj-1", endpoint)
    }

    #[test]
    fn test_url_for_substitutes_project_and_params() {
        let client = client("https://eg.cn-north-4.myhuaweicloud.com");
        assert_eq!(
            client.url_for(
                "v1/{project_id}/eventstreamings/{eventstreaming_id}",
                &[("eventstreaming_id", "abc-123")]
            ),
            "https://eg.cn-north-4.myhuaweicloud.com/v1/proj-1/eventstreamings/abc-123"
        );
    }

    #[test]
    fn test_url_for_encodes_param_values() {
        let client = client("http://localhost:1234/");
        assert_eq!(
            client.url_for("/v1/{project_id}/items/{name}", &[("name", "a b/c")]),
            "http://localhost:1234/v1/proj-1/items/a%20b%2Fc"
        );
    }
}
