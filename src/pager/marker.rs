//! Marker/limit pagination
//!
//! ELB v3 style listing: each request after the first carries `marker=<m>`,
//! where `m` is the next marker reported by the service or the ID of the
//! last record of the previous page.

use super::query::{append_param, QueryParams};
use super::{take_items, PageSource};
use crate::cloud::error::Result;
use crate::field_path::FieldPath;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct MarkerPager {
    first_url: String,
    page_size: usize,
    items_path: FieldPath,
    marker_field: FieldPath,
    next_marker_path: Option<FieldPath>,
}

impl MarkerPager {
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
            marker_field: FieldPath::key("id"),
            next_marker_path: None,
        }
    }

    /// Record field used as the marker when the response carries none
    pub fn with_marker_field(mut self, field: FieldPath) -> Self {
        self.marker_field = field;
        self
    }

    /// Response field holding the next marker, e.g. `page_info.next_marker`.
    /// When set and absent from a response, that page is the last one.
    pub fn with_next_marker_path(mut self, path: FieldPath) -> Self {
        self.next_marker_path = Some(path);
        self
    }

    pub fn first_url(&self) -> &str {
        &self.first_url
    }

    pub fn page_url(&self, marker: Option<&str>) -> String {
        match marker {
            Some(marker) => append_param(&self.first_url, "marker", marker),
            None => self.first_url.clone(),
        }
    }

    /// Fetch every page and return the records in server order
    pub async fn list_all<S>(&self, source: &S) -> Result<Vec<Value>>
    where
        S: PageSource + ?Sized,
    {
        let mut marker: Option<String> = None;
        let mut records = Vec::new();

        loop {
            let url = self.page_url(marker.as_deref());
            let mut body = source.fetch_page(&url).await?;

            let reported = self
                .next_marker_path
                .as_ref()
                .map(|path| path.lookup_str(&body));

            let items = take_items(&mut body, &self.items_path)?;
            let count = items.len();
            tracing::debug!("page after marker {:?} returned {} records", marker, count);

            let next = match reported {
                Some(reported) => reported,
                None => items.last().and_then(|last| self.marker_field.lookup_str(last)),
            };
            records.extend(items);

            if count < self.page_size {
                break;
            }
            match next {
                Some(next) if next.is_empty() => break,
                Some(next) if marker.as_deref() == Some(next.as_str()) => {
                    tracing::warn!("marker {} repeated, stopping pagination", next);
                    break;
                }
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        tracing::debug!("collected {} records from {}", records.len(), self.first_url);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::error::CloudError;
    use crate::pager::testing::ScriptedSource;
    use serde_json::json;

    fn listeners(ids: &[&str]) -> Vec<Value> {
        ids.iter().map(|id| json!({ "id": id, "name": format!("l-{}", id) })).collect()
    }

    fn pager(page_size: usize) -> MarkerPager {
        MarkerPager::new(
            "http://elb/v3/p/elb/listeners",
            page_size,
            "listeners".parse().unwrap(),
            &QueryParams::new().with("protocol", "HTTP"),
        )
    }

    #[tokio::test]
    async fn test_pages_by_last_record_id() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "listeners": listeners(&["a", "b"]) })),
            Ok(json!({ "listeners": listeners(&["c"]) })),
        ]);

        let result = pager(2).list_all(&source).await.unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(
            source.urls(),
            vec![
                "http://elb/v3/p/elb/listeners?limit=2&protocol=HTTP",
                "http://elb/v3/p/elb/listeners?limit=2&protocol=HTTP&marker=b",
            ]
        );
    }

    #[tokio::test]
    async fn test_pages_by_reported_next_marker() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "listeners": listeners(&["a", "b"]), "page_info": { "next_marker": "m-1" } })),
            Ok(json!({ "listeners": listeners(&["c", "d"]), "page_info": { "current_count": 2 } })),
        ]);

        let result = pager(2)
            .with_next_marker_path("page_info.next_marker".parse().unwrap())
            .list_all(&source)
            .await
            .unwrap();

        // The second page is full but reports no next marker
        assert_eq!(result.len(), 4);
        assert_eq!(source.urls().len(), 2);
        assert!(source.urls()[1].ends_with("&marker=m-1"));
    }

    #[tokio::test]
    async fn test_empty_page_ends_walk() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "listeners": listeners(&["a", "b"]) })),
            Ok(json!({ "listeners": [] })),
        ]);

        assert_eq!(pager(2).list_all(&source).await.unwrap().len(), 2);
        assert_eq!(source.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_first_page_ignores_next_marker() {
        let source = ScriptedSource::new(vec![Ok(
            json!({ "listeners": [], "page_info": { "next_marker": "m-1" } }),
        )]);

        let result = pager(2)
            .with_next_marker_path("page_info.next_marker".parse().unwrap())
            .list_all(&source)
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(source.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_marker_stops() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "listeners": listeners(&["a"]), "page_info": { "next_marker": "x" } })),
            Ok(json!({ "listeners": listeners(&["b"]), "page_info": { "next_marker": "x" } })),
        ]);

        let result = pager(1)
            .with_next_marker_path("page_info.next_marker".parse().unwrap())
            .list_all(&source)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(source.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_custom_marker_field() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "listeners": [{ "uuid": "u-1" }] })),
            Ok(json!({ "listeners": [] })),
        ]);

        pager(1)
            .with_marker_field("uuid".parse().unwrap())
            .list_all(&source)
            .await
            .unwrap();

        assert!(source.urls()[1].ends_with("&marker=u-1"));
    }

    #[tokio::test]
    async fn test_error_fails_fast() {
        let source = ScriptedSource::new(vec![
            Ok(json!({ "listeners": listeners(&["a", "b"]) })),
            Err(CloudError::from_response(403, r#"{"error_code":"ELB.0001","error_msg":"denied"}"#)),
        ]);

        let err = pager(2).list_all(&source).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}
