//! Provider
//!
//! Entry point for data source reads and resource operations. Owns the shared
//! HTTP client, the credentials and the region-to-project cache, and builds a
//! [`ServiceClient`] for each operation.

use crate::cloud::auth::Credentials;
use crate::cloud::catalog;
use crate::cloud::http::HwHttpClient;
use crate::cloud::projects::project_id_for_region;
use crate::cloud::{CloudError, ServiceClient};
use crate::config::Config;
use crate::resource::{
    dispatch, get_data_source, get_resource, read_data_source, Attributes, DataSourceDef,
    Diagnostic, ReadOutcome, ResourceDef, State,
};
use anyhow::{Context, Result};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Attribute every data source and resource may use to pick a region
const REGION_ATTR: &str = "region";

/// One entry of a batch read
#[derive(Debug, Clone)]
pub struct DataSourceRequest {
    pub key: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone)]
pub struct Provider {
    config: Config,
    http: HwHttpClient,
    credentials: Credentials,
    /// Region name to project ID, resolved at most once per region
    projects: Arc<Mutex<HashMap<String, Arc<OnceCell<String>>>>>,
}

impl Provider {
    /// Build a provider from validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let http = HwHttpClient::new(config.timeout()).context("Failed to create HTTP client")?;
        let credentials = Credentials::from_config(&config, http.inner().clone())?;

        let mut projects = HashMap::new();
        if let (Some(region), Some(project_id)) = (&config.region, &config.project_id) {
            projects.insert(
                region.clone(),
                Arc::new(OnceCell::new_with(Some(project_id.clone()))),
            );
        }

        tracing::info!(
            "provider configured for region {}",
            config.region.as_deref().unwrap_or_default()
        );

        Ok(Self {
            config,
            http,
            credentials,
            projects: Arc::new(Mutex::new(projects)),
        })
    }

    /// Region of an operation: its own `region` attribute, else the provider's
    pub fn region_of<'a>(&'a self, attrs: &'a Attributes) -> Result<&'a str> {
        match attrs.get(REGION_ATTR).and_then(Value::as_str) {
            Some(region) if !region.is_empty() => Ok(region),
            _ => self.config.region(),
        }
    }

    /// Project ID of `region`, resolved once and cached. Lookups of
    /// different regions run concurrently; callers asking for the same
    /// region wait for the first lookup.
    pub async fn project_id(&self, region: &str) -> Result<String> {
        let cell = {
            let mut projects = self.projects.lock().await;
            projects.entry(region.to_string()).or_default().clone()
        };

        cell.get_or_try_init(|| self.lookup_project_id(region))
            .await
            .cloned()
    }

    async fn lookup_project_id(&self, region: &str) -> Result<String> {
        let scoped = self.credentials.get_token(region).await?;
        let project_id = match scoped.project_id {
            Some(project_id) => project_id,
            None => {
                let identity_endpoint = self.config.identity_endpoint()?;
                project_id_for_region(&self.http, &identity_endpoint, &scoped.token, region)
                    .await
                    .with_context(|| format!("Failed to resolve the project of region {}", region))?
            }
        };

        tracing::debug!("region {} uses project {}", region, project_id);
        Ok(project_id)
    }

    /// Build a client for `service` in `region`
    pub async fn service_client(&self, service: &str, region: &str) -> Result<ServiceClient> {
        let entry = catalog::lookup(service)
            .ok_or_else(|| CloudError::UnknownService(service.to_string()))?;

        if self.config.region().ok() != Some(region) && !self.credentials.supports_any_region() {
            return Err(CloudError::Config(format!(
                "a static token only works for the provider region, not {}",
                region
            ))
            .into());
        }

        let endpoint = match self.config.endpoint_override(service)? {
            Some(endpoint) => endpoint,
            None => catalog::default_endpoint(entry, region, self.config.cloud_domain()),
        };
        let project_id = self.project_id(region).await?;

        Ok(ServiceClient::new(
            self.http.clone(),
            self.credentials.clone(),
            service,
            region,
            &project_id,
            &endpoint,
        ))
    }

    /// Read one data source. The state ID is a fresh UUID; the records are
    /// stored under the definition's result attribute.
    pub async fn read_data_source(&self, key: &str, attrs: &Attributes) -> Result<State> {
        let def = lookup_data_source(key)?;
        let region = self.region_of(attrs)?.to_string();
        let client = self.service_client(&def.service, &region).await?;

        let records = read_data_source(
            &client,
            def,
            attrs,
            self.config.enterprise_project_id.as_deref(),
        )
        .await?;

        let mut attributes = attrs.clone();
        attributes.insert(REGION_ATTR.to_string(), Value::String(region));
        attributes.insert(def.result_attr.clone(), Value::Array(records));

        Ok(State::new(uuid::Uuid::new_v4().to_string(), attributes))
    }

    /// Read several data sources concurrently. Failures are reported per
    /// request and do not abort the others.
    pub async fn read_data_sources(
        &self,
        requests: &[DataSourceRequest],
    ) -> Vec<std::result::Result<State, Diagnostic>> {
        let reads = requests
            .iter()
            .map(|request| self.read_data_source(&request.key, &request.attributes));

        join_all(reads)
            .await
            .into_iter()
            .zip(requests)
            .map(|(result, request)| {
                result.map_err(|e| {
                    tracing::warn!("reading {} failed: {:#}", request.key, e);
                    Diagnostic::from_error(&request.key, &e)
                })
            })
            .collect()
    }

    pub async fn create_resource(&self, key: &str, attrs: &Attributes) -> Result<State> {
        let def = lookup_resource(key)?;
        let client = self.resource_client(def, attrs).await?;
        let state = dispatch::create(&client, def, attrs).await?;
        Ok(with_region(state, &client.region))
    }

    pub async fn read_resource(&self, key: &str, id: &str, attrs: &Attributes) -> Result<ReadOutcome> {
        let def = lookup_resource(key)?;
        let client = self.resource_client(def, attrs).await?;
        Ok(match dispatch::read(&client, def, id, attrs).await? {
            ReadOutcome::Present(state) => ReadOutcome::Present(with_region(state, &client.region)),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    pub async fn update_resource(&self, key: &str, id: &str, attrs: &Attributes) -> Result<State> {
        let def = lookup_resource(key)?;
        let client = self.resource_client(def, attrs).await?;
        let state = dispatch::update(&client, def, id, attrs).await?;
        Ok(with_region(state, &client.region))
    }

    pub async fn delete_resource(&self, key: &str, id: &str, attrs: &Attributes) -> Result<()> {
        let def = lookup_resource(key)?;
        let client = self.resource_client(def, attrs).await?;
        dispatch::delete(&client, def, id, attrs).await
    }

    async fn resource_client(&self, def: &ResourceDef, attrs: &Attributes) -> Result<ServiceClient> {
        let region = self.region_of(attrs)?.to_string();
        self.service_client(&def.service, &region).await
    }
}

fn lookup_data_source(key: &str) -> Result<&'static DataSourceDef> {
    get_data_source(key).with_context(|| format!("Unknown data source: {}", key))
}

fn lookup_resource(key: &str) -> Result<&'static ResourceDef> {
    get_resource(key).with_context(|| format!("Unknown resource: {}", key))
}

fn with_region(mut state: State, region: &str) -> State {
    state
        .attributes
        .insert(REGION_ATTR.to_string(), Value::String(region.to_string()));
    state
}
