//! Offset/limit pagination
//!
//! Walks a collection endpoint with `?limit=N&...&offset=M`, advancing the
//! offset by the number of records each page returned. A page holding fewer
//! than `limit` records is the last one, so a page of exactly `limit` records
//! always costs one more round-trip.

use super::query::{append_param, QueryParams};
use super::{take_items, PageSource};
use crate::cloud::error::Result;
use crate::field_path::FieldPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page size used when a definition does not set one
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// How the pager decides that a page was the last one
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageEnd {
    /// Stop when a page has fewer records than the limit
    #[default]
    ShortPage,
    /// Stop only when a page comes back empty
    EmptyPage,
    /// Stop when the offset reaches the total count found at this path
    TotalField(FieldPath),
}

/// Offset pager for one collection query
#[derive(Debug, Clone)]
pub struct OffsetPager {
    first_url: String,
    page_size: usize,
    items_path: FieldPath,
    end: PageEnd,
}

impl OffsetPager {
    /// `base_url` has its placeholders substituted and may already carry a query
    pub fn new(base_url: &str, page_size: usize, items_path: FieldPath, query: &QueryParams) -> Self {
        let page_size = page_size.max(1);
        let mut first_url = append_param(base_url, "limit", &page_size.to_string());
        if !query.is_empty() {
            first_url.push('&');
            first_url.push_str(&query.encode());
        }

        Self {
            first_url,
            page_size,
            items_path,
            end: PageEnd::default(),
        }
    }

    pub fn with_end(mut self, end: PageEnd) -> Self {
        self.end = end;
        self
    }

    /// URL without the offset: base, limit and filters
    pub fn first_url(&self) -> &str {
        &self.first_url
    }

    /// URL of the page starting at `offset`
    pub fn page_url(&self, offset: usize) -> String {
        format!("{}&offset={}", self.first_url, offset)
    }

    /// Fetch every page and return the records in server order.
    /// The first failing request aborts the walk and its error is returned.
    pub async fn list_all<S>(&self, source: &S) -> Result<Vec<Value>>
    where
        S: PageSource + ?Sized,
    {
        let mut offset = 0;
        let mut records = Vec::new();

        loop {
            let url = self.page_url(offset);
            let mut body = source.fetch_page(&url).await?;

            let total = match &self.end {
                PageEnd::TotalField(path) => Some(read_total(&body, path)),
                _ => None,
            };

            let items = take_items(&mut body, &self.items_path)?;
            let count = items.len();
            tracing::debug!(
                "page at offset {} returned {} records (limit {})",
                offset,
                count,
                self.page_size
            );
            records.extend(items);

            let last_page = match &self.end {
                PageEnd::ShortPage => count < self.page_size,
                PageEnd::EmptyPage => count == 0,
                PageEnd::TotalField(_) => count == 0 || offset + count >= total.unwrap_or(0),
            };
            if last_page {
                break;
            }

            offset += count;
        }

        tracing::debug!("collected {} records from {}", records.len(), self.first_url);
        Ok(records)
    }
}

/// Total count at `path`; missing or non-numeric counts read as zero
fn read_total(body: &Value, path: &FieldPath) -> usize {
    match path.lookup(body) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0) as usize,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CloudError;
    use crate::pager::testing::ScriptedSource;
    use serde_json::json;

    fn records(range: std::ops::Range<usize>) -> Vec<Value> {
        range.map(|i| json!({ "id": format!("r-{}", i) })).collect()
    }

    fn items_page(records: Vec<Value>) -> Value {
        json!({ "items": records })
    }

    fn pager(page_size: usize) -> OffsetPager {
        OffsetPager::new(
            "http://svc/v1/p/connections",
            page_size,
            "items".parse().unwrap(),
            &QueryParams::new(),
        )
    }

    #[tokio::test]
    async fn test_short_second_page_ends_walk() {
        let source = ScriptedSource::new(vec![
            Ok(items_page(records(0..2))),
            Ok(items_page(records(2..3))),
        ]);

        let result = pager(2).list_all(&source).await.unwrap();

        assert_eq!(result, records(0..3));
        assert_eq!(
            source.urls(),
            vec![
                "http://svc/v1/p/connections?limit=2&offset=0",
                "http://svc/v1/p/connections?limit=2&offset=2",
            ]
        );
    }

    #[tokio::test]
    async fn test_full_page_costs_one_more_request() {
        let source = ScriptedSource::new(vec![
            Ok(items_page(records(0..500))),
            Ok(items_page(vec![])),
        ]);

        let result = pager(500).list_all(&source).await.unwrap();

        assert_eq!(result.len(), 500);
        assert_eq!(source.urls().len(), 2);
        assert!(source.urls()[1].ends_with("&offset=500"));
    }

    #[tokio::test]
    async fn test_empty_first_page_issues_one_request() {
        let source = ScriptedSource::new(vec![Ok(items_page(vec![]))]);

        let result = pager(100).list_all(&source).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(source.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_error_discards_partial_results() {
        let source = ScriptedSource::new(vec![
            Ok(items_page(records(0..2))),
            Err(CloudError::from_response(500, "")),
            Ok(items_page(records(2..3))),
        ]);

        let err = pager(2).list_all(&source).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(source.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_filters_repeat_on_every_page() {
        let query = QueryParams::new().with("name", "web").with("status", "ACTIVE");
        let pager = OffsetPager::new(
            "http://svc/v1/p/eventstreamings",
            1,
            "items".parse().unwrap(),
            &query,
        );
        let source = ScriptedSource::new(vec![
            Ok(items_page(records(0..1))),
            Ok(items_page(records(1..2))),
            Ok(items_page(vec![])),
        ]);

        pager.list_all(&source).await.unwrap();

        for (offset, url) in source.urls().iter().enumerate() {
            assert_eq!(
                url,
                &format!(
                    "http://svc/v1/p/eventstreamings?limit=1&name=web&status=ACTIVE&offset={}",
                    offset
                )
            );
        }
    }

    #[tokio::test]
    async fn test_base_url_with_existing_query() {
        let pager = OffsetPager::new(
            "http://svc/v5/iot/p/rules?app_id=a1",
            50,
            "rules".parse().unwrap(),
            &QueryParams::new(),
        );
        assert_eq!(pager.page_url(0), "http://svc/v5/iot/p/rules?app_id=a1&limit=50&offset=0");
    }

    #[tokio::test]
    async fn test_nested_items_path_and_missing_field() {
        let pager = OffsetPager::new(
            "http://svc/v1/p/quotas",
            10,
            "quotas.resources".parse().unwrap(),
            &QueryParams::new(),
        );
        let source = ScriptedSource::new(vec![Ok(json!({ "quotas": { "resources": [{"type": "elb"}] } }))]);
        assert_eq!(pager.list_all(&source).await.unwrap(), vec![json!({"type": "elb"})]);

        // An absent items field reads as an empty page
        let source = ScriptedSource::new(vec![Ok(json!({ "count": 0 }))]);
        assert!(pager.list_all(&source).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_array_items_is_a_shape_error() {
        let source = ScriptedSource::new(vec![Ok(json!({ "items": { "id": "x" } }))]);
        let err = pager(10).list_all(&source).await.unwrap_err();
        assert!(matches!(err, CloudError::UnexpectedShape { .. }));
    }

    #[tokio::test]
    async fn test_empty_page_mode_ignores_short_pages() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "channels": records(0..3) })),
            Ok(json!({ "channels": records(3..4) })),
            Ok(json!({ "channels": [] })),
        ]);
        let pager = OffsetPager::new(
            "http://svc/v1/p/ott/channels",
            100,
            "channels".parse().unwrap(),
            &QueryParams::new(),
        )
        .with_end(PageEnd::EmptyPage);

        let result = pager.list_all(&source).await.unwrap();

        assert_eq!(result, records(0..4));
        assert!(source.urls()[1].ends_with("offset=3"));
        assert!(source.urls()[2].ends_with("offset=4"));
    }

    #[tokio::test]
    async fn test_total_field_mode_stops_at_total() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "instances": records(0..2), "instance_num": 3 })),
            Ok(json!({ "instances": records(2..3), "instance_num": 3 })),
        ]);
        let pager = OffsetPager::new(
            "http://svc/v2/p/instances",
            2,
            "instances".parse().unwrap(),
            &QueryParams::new(),
        )
        .with_end(PageEnd::TotalField("instance_num".parse().unwrap()));

        let result = pager.list_all(&source).await.unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(source.urls().len(), 2);
    }

    #[test]
    fn test_page_end_deserializes() {
        assert_eq!(serde_json::from_value::<PageEnd>(json!("short_page")).unwrap(), PageEnd::ShortPage);
        assert_eq!(serde_json::from_value::<PageEnd>(json!("empty_page")).unwrap(), PageEnd::EmptyPage);
        assert_eq!(
            serde_json::from_value::<PageEnd>(json!({ "total_field": "instance_num" })).unwrap(),
            PageEnd::TotalField("instance_num".parse().unwrap())
        );
    }
}
