//! Paginated listing
//!
//! Collection endpoints are walked page by page until the service signals the
//! end. Two cursor styles are supported: offset/limit ([`OffsetPager`]) and
//! marker/limit ([`MarkerPager`]). Both issue strictly sequential requests and
//! fail fast on the first error.

pub mod marker;
pub mod offset;
pub mod query;

pub use marker::MarkerPager;
pub use offset::{OffsetPager, PageEnd, DEFAULT_PAGE_SIZE};
pub use query::QueryParams;

use crate::cloud::error::{CloudError, Result};
use crate::cloud::ServiceClient;
use crate::field_path::FieldPath;
use async_trait::async_trait;
use serde_json::Value;

/// Something that can return the JSON body of a page URL
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<Value>;
}

#[async_trait]
impl PageSource for ServiceClient {
    async fn fetch_page(&self, url: &str) -> Result<Value> {
        self.get(url).await
    }
}

/// Move the records array at `path` out of a page body.
/// A missing or null field is an empty page.
pub(crate) fn take_items(body: &mut Value, path: &FieldPath) -> Result<Vec<Value>> {
    match path.lookup_mut(body).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(CloudError::UnexpectedShape {
            path: path.to_string(),
            expected: "array",
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_take_items_moves_array_out() {
        let mut body = json!({ "items": [1, 2], "count": 2 });
        let items = take_items(&mut body, &"items".parse().unwrap()).unwrap();
        assert_eq!(items, vec![json!(1), json!(2)]);
        assert_eq!(body["count"], json!(2));
    }

    #[test]
    fn test_take_items_null_is_empty() {
        let mut body = json!({ "items": null });
        assert!(take_items(&mut body, &"items".parse().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_take_items_root_array() {
        let mut body = json!([{ "id": "a" }]);
        assert_eq!(take_items(&mut body, &FieldPath::root()).unwrap().len(), 1);
    }
}
