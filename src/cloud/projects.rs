//! IAM Projects
//!
//! Region-to-project lookups. Service URLs embed the project ID of the region
//! they are called in, and the default project of a region shares its name.

use super::error::{CloudError, Result};
use super::http::HwHttpClient;
use serde::Deserialize;

/// Project information
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<Project>,
}

/// List the projects named after `region`
pub async fn list_region_projects(
    http: &HwHttpClient,
    identity_endpoint: &str,
    token: &str,
    region: &str,
) -> Result<Vec<Project>> {
    let url = format!(
        "{}/projects?name={}",
        identity_endpoint,
        urlencoding::encode(region)
    );
    let response = http.get(&url, token).await?;
    let list: ProjectList = serde_json::from_value(response)?;

    Ok(list
        .projects
        .into_iter()
        .filter(|p| p.enabled != Some(false))
        .collect())
}

/// Resolve the project ID of `region`
pub async fn project_id_for_region(
    http: &HwHttpClient,
    identity_endpoint: &str,
    token: &str,
    region: &str,
) -> Result<String> {
    let projects = list_region_projects(http, identity_endpoint, token, region).await?;

    projects
        .into_iter()
        .find(|p| p.name == region)
        .map(|p| p.id)
        .ok_or_else(|| CloudError::Config(format!("no project found for region {}", region)))
}
