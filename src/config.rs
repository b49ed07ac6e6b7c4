//! Configuration Management
//!
//! Provider-level settings: region, credentials, endpoint overrides. Values
//! come from the config file, then `HW_*` environment variables, then CLI flags.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Cloud domain used to build service endpoints when none is configured
pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Provider-level region, used when a data source or resource does not set one
    #[serde(default)]
    pub region: Option<String>,
    /// Project ID of the provider-level region
    #[serde(default)]
    pub project_id: Option<String>,
    /// Cloud domain, e.g. `myhuaweicloud.com`
    #[serde(default)]
    pub cloud: Option<String>,
    /// IAM endpoint, e.g. `https://iam.cn-north-4.myhuaweicloud.com/v3`
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Pre-issued IAM token
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default)]
    pub enterprise_project_id: Option<String>,
    /// Custom endpoints overriding the default `https://{service}.{region}.{cloud}/`
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hwcloud-provider").join("config.json"))
    }

    /// Load configuration from disk and the environment.
    /// A missing or unreadable file yields defaults.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path).unwrap_or_else(|e| {
                tracing::warn!("Ignoring config file {:?}: {:#}", path, e);
                Self::default()
            }),
            _ => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Read configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Apply `HW_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("HW_REGION_NAME") {
            self.region = Some(v);
        }
        if let Some(v) = get("HW_PROJECT_ID") {
            self.project_id = Some(v);
        }
        if let Some(v) = get("HW_CLOUD") {
            self.cloud = Some(v);
        }
        if let Some(v) = get("HW_AUTH_URL") {
            self.auth_url = Some(v);
        }
        if let Some(v) = get("HW_DOMAIN_NAME") {
            self.domain_name = Some(v);
        }
        if let Some(v) = get("HW_USER_NAME") {
            self.user_name = Some(v);
        }
        if let Some(v) = get("HW_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = get("HW_AUTH_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = get("HW_ENTERPRISE_PROJECT_ID") {
            self.enterprise_project_id = Some(v);
        }
    }

    /// Cloud domain (configured or default)
    pub fn cloud_domain(&self) -> &str {
        self.cloud.as_deref().unwrap_or(DEFAULT_CLOUD)
    }

    /// Provider-level region
    pub fn region(&self) -> Result<&str> {
        self.region
            .as_deref()
            .context("No region configured. Set HW_REGION_NAME or use --region")
    }

    /// IAM v3 endpoint, without trailing slash
    pub fn identity_endpoint(&self) -> Result<String> {
        match &self.auth_url {
            Some(url) => Ok(url.trim_end_matches('/').to_string()),
            None => Ok(format!(
                "https://iam.{}.{}/v3",
                self.region()?,
                self.cloud_domain()
            )),
        }
    }

    /// HTTP request timeout
    pub fn timeout(&self) -> Duration {
        self.request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::cloud::http::DEFAULT_TIMEOUT)
    }

    /// Custom endpoint for a service, normalized to end with `/`
    pub fn endpoint_override(&self, service: &str) -> Result<Option<String>> {
        self.endpoints
            .get(service)
            .map(|raw| normalize_endpoint(raw))
            .transpose()
    }

    /// Check that the configuration can build authenticated clients
    pub fn validate(&self) -> Result<()> {
        self.region()?;

        let has_token = self.token.as_deref().is_some_and(|t| !t.is_empty());
        let has_password = self.user_name.is_some() && self.password.is_some() && self.domain_name.is_some();
        if !has_token && !has_password {
            bail!(
                "No credentials configured. Set HW_AUTH_TOKEN, or HW_USER_NAME, HW_PASSWORD and HW_DOMAIN_NAME"
            );
        }

        for (service, raw) in &self.endpoints {
            normalize_endpoint(raw)
                .with_context(|| format!("Invalid endpoint for service {}", service))?;
        }

        Ok(())
    }
}

/// Parse an endpoint URL and make sure it ends with a slash
pub fn normalize_endpoint(raw: &str) -> Result<String> {
    let url = Url::parse(raw).with_context(|| format!("Failed to parse endpoint URL: {}", raw))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        bail!("Endpoint must use http or https: {}", raw);
    }

    let mut normalized = url.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}
