//! IAM Authentication
//!
//! Supplies `X-Auth-Token` values for service requests, either from a
//! pre-issued token or by exchanging user/password credentials for a
//! project-scoped token. Password tokens are cached per region.

use super::error::{CloudError, Result};
use crate::config::Config;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Header carrying a freshly issued token in the IAM response
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Token TTL if the IAM response carries no usable expiry
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Where tokens come from
#[derive(Clone)]
pub enum TokenSource {
    /// A pre-issued token, valid only for the project it was scoped to
    Static(String),
    /// User/password exchanged against IAM for each region's project
    Password {
        identity_endpoint: String,
        domain_name: String,
        user_name: String,
        password: String,
    },
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("Static(<redacted>)"),
            TokenSource::Password {
                identity_endpoint,
                domain_name,
                user_name,
                ..
            } => f
                .debug_struct("Password")
                .field("identity_endpoint", identity_endpoint)
                .field("domain_name", domain_name)
                .field("user_name", user_name)
                .finish_non_exhaustive(),
        }
    }
}

/// A token together with the project it is scoped to, when IAM told us
#[derive(Debug, Clone)]
pub struct ScopedToken {
    pub token: String,
    pub project_id: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    scoped: ScopedToken,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Credentials holder with per-region token caching
#[derive(Clone, Debug)]
pub struct Credentials {
    source: TokenSource,
    http: Client,
    token_cache: Arc<RwLock<HashMap<String, CachedToken>>>,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("project_id", &self.scoped.project_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Build credentials from the provider configuration
    pub fn from_config(config: &Config, http: Client) -> Result<Self> {
        let source = if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            TokenSource::Static(token.to_string())
        } else {
            match (&config.domain_name, &config.user_name, &config.password) {
                (Some(domain), Some(user), Some(password)) => TokenSource::Password {
                    identity_endpoint: config
                        .identity_endpoint()
                        .map_err(|e| CloudError::Config(format!("{:#}", e)))?,
                    domain_name: domain.clone(),
                    user_name: user.clone(),
                    password: password.clone(),
                },
                _ => {
                    return Err(CloudError::Config(
                        "either a token or user_name, password and domain_name must be set".to_string(),
                    ))
                }
            }
        };

        Ok(Self::new(source, http))
    }

    pub fn new(source: TokenSource, http: Client) -> Self {
        Self {
            source,
            http,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    /// Whether tokens can be issued for regions other than the provider's own
    pub fn supports_any_region(&self) -> bool {
        matches!(self.source, TokenSource::Password { .. })
    }

    /// Get a token usable for requests in `region`
    /// Checks token expiry before returning a cached token
    pub async fn get_token(&self, region: &str) -> Result<ScopedToken> {
        let (identity_endpoint, domain_name, user_name, password) = match &self.source {
            TokenSource::Static(token) => {
                return Ok(ScopedToken {
                    token: token.clone(),
                    project_id: None,
                })
            }
            TokenSource::Password {
                identity_endpoint,
                domain_name,
                user_name,
                password,
            } => (identity_endpoint, domain_name, user_name, password),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.get(region) {
                if cached.is_valid() {
                    return Ok(cached.scoped.clone());
                }
                tracing::debug!("Cached token for {} expired, fetching new token", region);
            }
        }

        let (scoped, expires_at) = self
            .issue_password_token(identity_endpoint, domain_name, user_name, password, region)
            .await?;

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(
                region.to_string(),
                CachedToken {
                    scoped: scoped.clone(),
                    expires_at,
                },
            );
        }

        Ok(scoped)
    }

    async fn issue_password_token(
        &self,
        identity_endpoint: &str,
        domain_name: &str,
        user_name: &str,
        password: &str,
        region: &str,
    ) -> Result<(ScopedToken, Instant)> {
        let url = format!("{}/auth/tokens", identity_endpoint);
        tracing::debug!("POST {} (user={}, scope={})", url, user_name, region);

        // The default project of a region carries the region's name
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": user_name,
                            "password": password,
                            "domain": { "name": domain_name }
                        }
                    }
                },
                "scope": {
                    "project": { "name": region }
                }
            }
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let response_body = response.text().await?;

        if !status.is_success() {
            tracing::error!("IAM token request failed: {}", status);
            return Err(CloudError::from_response(status.as_u16(), &response_body));
        }

        let token = token.ok_or_else(|| CloudError::MissingField(SUBJECT_TOKEN_HEADER.to_string()))?;
        let parsed: TokenResponse = serde_json::from_str(&response_body)?;

        let ttl = parsed
            .token
            .expires_at
            .map(|at| ttl_until(at, Utc::now()))
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        tracing::debug!(
            "New token cached for {}, expires in ~{} minutes",
            region,
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok((
            ScopedToken {
                token,
                project_id: parsed.token.project.map(|p| p.id),
            },
            expires_at,
        ))
    }
}

/// Time left until `expires_at`, zero if already past
fn ttl_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    project: Option<TokenProject>,
}

#[derive(Debug, Deserialize)]
struct TokenProject {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_parses_project_and_expiry() {
        let body = r#"{
            "token": {
                "expires_at": "2026-10-20T08:00:00.000000Z",
                "project": {"id": "0123456789abcdef", "name": "cn-north-4"},
                "methods": ["password"]
            }
        }"#;
        let parsed: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.token.project.unwrap().id, "0123456789abcdef");
        assert!(parsed.token.expires_at.is_some());
    }

    #[test]
    fn test_ttl_until_clamps_past_expiry() {
        let now = Utc::now();
        assert_eq!(ttl_until(now - chrono::Duration::minutes(5), now), Duration::ZERO);
        assert_eq!(
            ttl_until(now + chrono::Duration::minutes(10), now),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_from_config_prefers_static_token() {
        let config = Config {
            region: Some("cn-north-4".to_string()),
            token: Some("abc".to_string()),
            user_name: Some("user".to_string()),
            ..Default::default()
        };
        let creds = Credentials::from_config(&config, Client::new()).unwrap();
        assert!(matches!(creds.source(), TokenSource::Static(t) if t == "abc"));
        assert!(!creds.supports_any_region());
        assert_eq!(format!("{:?}", creds.source()), "Static(<redacted>)");
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = Config {
            region: Some("cn-north-4".to_string()),
            user_name: Some("user".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Credentials::from_config(&config, Client::new()),
            Err(CloudError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_static_token_is_returned_for_any_region() {
        let creds = Credentials::new(TokenSource::Static("abc".to_string()), Client::new());
        let scoped = creds.get_token("cn-south-1").await.unwrap();
        assert_eq!(scoped.token, "abc");
        assert!(scoped.project_id.is_none());
    }
}
