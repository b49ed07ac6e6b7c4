//! Definition Registry - Load data source and resource definitions from JSON
//!
//! This module loads all definitions from embedded JSON files and provides
//! lookup functions for the rest of the crate.

use super::expand::{BodyField, FilterDef};
use super::flatten::FieldDef;
use crate::field_path::FieldPath;
use crate::pager::{PageEnd, DEFAULT_PAGE_SIZE};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded definition files (compiled into the binary)
const DEFINITION_FILES: &[&str] = &[
    include_str!("../resources/dms.json"),
    include_str!("../resources/eg.json"),
    include_str!("../resources/elb.json"),
    include_str!("../resources/iotda.json"),
    include_str!("../resources/live.json"),
    include_str!("../resources/secmaster.json"),
    include_str!("../resources/workspace.json"),
];

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// How a collection endpoint is paged
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    Offset {
        #[serde(default = "default_page_size")]
        limit: usize,
        #[serde(default)]
        end: PageEnd,
    },
    Marker {
        #[serde(default = "default_page_size")]
        limit: usize,
        #[serde(default)]
        marker_field: Option<FieldPath>,
        #[serde(default)]
        next_marker_path: Option<FieldPath>,
    },
    /// The whole collection comes back in one response
    Single,
}

/// Client-side filter: keep records whose value at `path` equals the attribute
#[derive(Debug, Clone, Deserialize)]
pub struct LocalFilter {
    pub attr: String,
    pub path: FieldPath,
}

/// Data source definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceDef {
    /// Human readable name, used in error messages
    pub display_name: String,
    pub service: String,
    /// Collection URL template, e.g. `v1/{project_id}/connections`
    pub path: String,
    /// Location of the records array in each page
    pub items_path: FieldPath,
    pub pagination: Pagination,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
    /// Send the provider's enterprise project ID when the caller sets none
    #[serde(default)]
    pub enterprise_project: bool,
    #[serde(default)]
    pub local_filters: Vec<LocalFilter>,
    /// Attribute holding the flattened records
    pub result_attr: String,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateMethod {
    #[default]
    Put,
    Post,
    Patch,
}

impl UpdateMethod {
    pub fn as_method(self) -> reqwest::Method {
        match self {
            UpdateMethod::Put => reqwest::Method::PUT,
            UpdateMethod::Post => reqwest::Method::POST,
            UpdateMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

fn default_id_param() -> String {
    "id".to_string()
}

/// Request sent on update when any attribute in `when` is set
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStep {
    pub path: String,
    #[serde(default)]
    pub method: UpdateMethod,
    pub when: Vec<String>,
    #[serde(default)]
    pub body: Vec<BodyField>,
}

/// Operation posted after create and update, e.g. starting an event stream
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDef {
    /// Attribute holding the requested operation
    pub attr: String,
    pub path: String,
    /// Body key the operation is sent under
    pub body_key: String,
    #[serde(default)]
    pub values: Vec<String>,
    /// State a freshly created or updated object is in; no request is needed to reach it
    pub initial: String,
    /// Status field the current operation is derived from on read
    #[serde(default)]
    pub status_path: Option<FieldPath>,
    /// Status value to operation; unlisted statuses map to `initial`
    #[serde(default)]
    pub from_status: HashMap<String, String>,
}

/// Managed resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub service: String,
    /// Collection URL the create request is posted to
    pub create_path: String,
    /// Item URL template; holds the `{id_param}` placeholder
    pub item_path: String,
    #[serde(default = "default_id_param")]
    pub id_param: String,
    /// Location of the new ID in the create response
    #[serde(default)]
    pub id_path: Option<FieldPath>,
    /// Attribute holding a caller-chosen ID, sent in the create body.
    /// A v4 UUID is used when it is unset.
    #[serde(default)]
    pub id_attr: Option<String>,
    /// Location of the object in the read response
    #[serde(default)]
    pub read_root: FieldPath,
    #[serde(default)]
    pub create_body: Vec<BodyField>,
    #[serde(default)]
    pub update_body: Vec<BodyField>,
    #[serde(default)]
    pub update_method: UpdateMethod,
    /// Per-section update requests; replace the single item update when set
    #[serde(default)]
    pub update_steps: Vec<UpdateStep>,
    #[serde(default)]
    pub action: Option<ActionDef>,
    pub fields: Vec<FieldDef>,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefinitionConfig {
    #[serde(default)]
    pub data_sources: HashMap<String, DataSourceDef>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<DefinitionConfig> = OnceLock::new();

/// Get the definition registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static DefinitionConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = DefinitionConfig::default();

        for content in DEFINITION_FILES {
            let partial: DefinitionConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded definition JSON: {}", e));
            final_config.data_sources.extend(partial.data_sources);
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a data source definition by key
pub fn get_data_source(key: &str) -> Option<&'static DataSourceDef> {
    get_registry().data_sources.get(key)
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// All data source keys, sorted
pub fn get_all_data_source_keys() -> Vec<&'static str> {
    let mut keys: Vec<_> = get_registry()
        .data_sources
        .keys()
        .map(|s| s.as_str())
        .collect();
    keys.sort_unstable();
    keys
}

/// All resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    let mut keys: Vec<_> = get_registry().resources.keys().map(|s| s.as_str()).collect();
    keys.sort_unstable();
    keys
}
