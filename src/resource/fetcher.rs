//! Data Source Fetcher
//!
//! Reads a data source: expands the caller's attributes into a collection URL
//! and query, walks every page, applies client-side filters and flattens the
//! records.

use super::expand::{build_query, path_params};
use super::flatten::flatten_item;
use super::registry::{DataSourceDef, LocalFilter, Pagination};
use super::state::Attributes;
use crate::cloud::ServiceClient;
use crate::pager::query::append_query;
use crate::pager::{take_items, MarkerPager, OffsetPager, PageSource};
use anyhow::{Context, Result};
use serde_json::Value;

/// Fetch all raw records of a data source
pub async fn fetch_records(
    client: &ServiceClient,
    def: &DataSourceDef,
    attrs: &Attributes,
    enterprise_project_id: Option<&str>,
) -> Result<Vec<Value>> {
    let params = path_params(&def.path, attrs, &[])?;
    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let base_url = client.url_for(&def.path, &params);

    let eps_id = if def.enterprise_project {
        enterprise_project_id
    } else {
        None
    };
    let query = build_query(&def.filters, attrs, eps_id)?;

    let records = match &def.pagination {
        Pagination::Offset { limit, end } => {
            OffsetPager::new(&base_url, *limit, def.items_path.clone(), &query)
                .with_end(end.clone())
                .list_all(client)
                .await
        }
        Pagination::Marker {
            limit,
            marker_field,
            next_marker_path,
        } => {
            let mut pager = MarkerPager::new(&base_url, *limit, def.items_path.clone(), &query);
            if let Some(field) = marker_field {
                pager = pager.with_marker_field(field.clone());
            }
            if let Some(path) = next_marker_path {
                pager = pager.with_next_marker_path(path.clone());
            }
            pager.list_all(client).await
        }
        Pagination::Single => {
            let url = append_query(&base_url, &query);
            client
                .fetch_page(&url)
                .await
                .and_then(|mut body| take_items(&mut body, &def.items_path))
        }
    };

    records.with_context(|| format!("error retrieving {}", def.display_name))
}

/// Read a data source and return its flattened records
pub async fn read_data_source(
    client: &ServiceClient,
    def: &DataSourceDef,
    attrs: &Attributes,
    enterprise_project_id: Option<&str>,
) -> Result<Vec<Value>> {
    let records = fetch_records(client, def, attrs, enterprise_project_id).await?;
    let total = records.len();

    let flattened: Vec<Value> = records
        .iter()
        .filter(|record| matches_local_filters(record, &def.local_filters, attrs))
        .map(|record| Value::Object(flatten_item(record, &def.fields)))
        .collect();

    tracing::info!(
        "{}: {} records fetched, {} kept",
        def.display_name,
        total,
        flattened.len()
    );
    Ok(flattened)
}

/// Whether a record passes every local filter the caller set
fn matches_local_filters(record: &Value, filters: &[LocalFilter], attrs: &Attributes) -> bool {
    filters.iter().all(|filter| {
        let Some(wanted) = attrs.get(&filter.attr).filter(|v| !v.is_null()) else {
            return true;
        };
        match filter.path.lookup(record) {
            Some(actual) => scalar_text(actual) == scalar_text(wanted),
            None => false,
        }
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
