//! Flattening API records into attributes
//!
//! Every attribute declares where it lives in the record and what JSON type it
//! carries. A value whose type does not match its declared kind becomes `null`.

use super::state::Attributes;
use crate::field_path::FieldPath;
use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Epoch values above this are taken to be milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    String,
    Int,
    Float,
    Bool,
    StringList,
    /// Object with string values
    Map,
    /// `[{key, value}]` pairs, collapsed into a string map
    Tags,
    /// Any JSON value, passed through
    Json,
    /// Any JSON value, serialized to a string
    JsonString,
    /// Epoch seconds or milliseconds, rendered as RFC 3339
    Timestamp,
    /// Nested object, exposed as a one-element list
    Object,
    /// Array of nested objects
    List,
}

/// One attribute of a flattened record
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Location in the record; defaults to the attribute name
    #[serde(default)]
    pub path: Option<FieldPath>,
    #[serde(default)]
    pub kind: FieldKind,
    /// Nested attributes of `object` and `list` kinds
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl FieldDef {
    fn source<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        match &self.path {
            Some(path) => path.lookup(record),
            None => record.get(&self.name),
        }
    }
}

/// Flatten one record
pub fn flatten_item(record: &Value, fields: &[FieldDef]) -> Attributes {
    fields
        .iter()
        .map(|def| (def.name.clone(), flatten_value(def.source(record), def)))
        .collect()
}

fn flatten_value(value: Option<&Value>, def: &FieldDef) -> Value {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Value::Null;
    };

    match def.kind {
        FieldKind::String => match value {
            Value::String(_) => value.clone(),
            _ => Value::Null,
        },
        FieldKind::Int => value.as_i64().map(Value::from).unwrap_or(Value::Null),
        FieldKind::Float => value.as_f64().map(Value::from).unwrap_or(Value::Null),
        FieldKind::Bool => match value {
            Value::Bool(_) => value.clone(),
            _ => Value::Null,
        },
        FieldKind::StringList => match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| item.is_string())
                    .cloned()
                    .collect(),
            ),
            _ => Value::Null,
        },
        FieldKind::Map => match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(scalar_to_string(v))))
                    .collect(),
            ),
            _ => Value::Null,
        },
        FieldKind::Tags => flatten_tags(value),
        FieldKind::Json => value.clone(),
        FieldKind::JsonString => match value {
            Value::String(_) => value.clone(),
            other => match serde_json::to_string(other) {
                Ok(encoded) => Value::String(encoded),
                Err(e) => {
                    tracing::warn!("error marshaling {} to JSON: {}", def.name, e);
                    Value::Null
                }
            },
        },
        FieldKind::Timestamp => flatten_timestamp(value),
        FieldKind::Object => match value {
            Value::Object(_) => Value::Array(vec![Value::Object(flatten_item(value, &def.fields))]),
            _ => Value::Null,
        },
        FieldKind::List => match value {
            Value::Array(items) if def.fields.is_empty() => Value::Array(items.clone()),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(|item| Value::Object(flatten_item(item, &def.fields)))
                    .collect(),
            ),
            _ => Value::Null,
        },
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten_tags(value: &Value) -> Value {
    match value {
        Value::Array(pairs) => {
            let mut tags = Map::new();
            for pair in pairs {
                if let Some(key) = pair.get("key").and_then(Value::as_str) {
                    let tag_value = pair.get("value").map(scalar_to_string).unwrap_or_default();
                    tags.insert(key.to_string(), Value::String(tag_value));
                }
            }
            Value::Object(tags)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(scalar_to_string(v))))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn flatten_timestamp(value: &Value) -> Value {
    let raw = match value {
        Value::Number(n) => n.as_i64(),
        // Some services send epoch milliseconds as a string
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(raw) => Some(raw),
            Err(_) => return value.clone(),
        },
        _ => None,
    };

    raw.and_then(|raw| {
        if raw.abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(raw)
        } else {
            DateTime::from_timestamp(raw, 0)
        }
    })
    .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
    .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(defs: Value) -> Vec<FieldDef> {
        serde_json::from_value(defs).unwrap()
    }

    #[test]
    fn test_scalar_kinds_and_mismatches() {
        let defs = fields(json!([
            {"name": "name"},
            {"name": "protocol_port", "kind": "int"},
            {"name": "weight", "kind": "float"},
            {"name": "http2_enable", "kind": "bool"},
            {"name": "bad_int", "path": "name", "kind": "int"},
            {"name": "missing"}
        ]));
        let record = json!({
            "name": "listener-1",
            "protocol_port": 443,
            "weight": 1.5,
            "http2_enable": true
        });

        let attrs = flatten_item(&record, &defs);

        assert_eq!(attrs["name"], json!("listener-1"));
        assert_eq!(attrs["protocol_port"], json!(443));
        assert_eq!(attrs["weight"], json!(1.5));
        assert_eq!(attrs["http2_enable"], json!(true));
        assert_eq!(attrs["bad_int"], Value::Null);
        assert_eq!(attrs["missing"], Value::Null);
    }

    #[test]
    fn test_quoted_and_indexed_paths() {
        let defs = fields(json!([
            {"name": "forward_elb", "path": "insert_headers.\"X-Forwarded-ELB-IP\"", "kind": "bool"},
            {"name": "loadbalancer_id", "path": "loadbalancers[0].id"}
        ]));
        let record = json!({
            "insert_headers": {"X-Forwarded-ELB-IP": true},
            "loadbalancers": [{"id": "lb-1"}]
        });

        let attrs = flatten_item(&record, &defs);

        assert_eq!(attrs["forward_elb"], json!(true));
        assert_eq!(attrs["loadbalancer_id"], json!("lb-1"));
    }

    #[test]
    fn test_tags_and_maps() {
        let defs = fields(json!([
            {"name": "tags", "kind": "tags"},
            {"name": "labels", "kind": "map"}
        ]));
        let record = json!({
            "tags": [{"key": "env", "value": "prod"}, {"key": "team"}],
            "labels": {"tier": "web", "replicas": 3}
        });

        let attrs = flatten_item(&record, &defs);

        assert_eq!(attrs["tags"], json!({"env": "prod", "team": ""}));
        assert_eq!(attrs["labels"], json!({"tier": "web", "replicas": "3"}));
    }

    #[test]
    fn test_json_string_serializes_nested_value() {
        let defs = fields(json!([{"name": "filter", "kind": "json_string"}]));
        let attrs = flatten_item(&json!({"filter": {"source": ["HC.OBS"]}}), &defs);
        assert_eq!(attrs["filter"], json!(r#"{"source":["HC.OBS"]}"#));
    }

    #[test]
    fn test_timestamp_seconds_and_millis() {
        let defs = fields(json!([
            {"name": "created_at", "kind": "timestamp"},
            {"name": "updated_at", "kind": "timestamp"},
            {"name": "deleted_at", "kind": "timestamp"},
            {"name": "expired_at", "kind": "timestamp"}
        ]));
        let record = json!({
            "created_at": 1_700_000_000,
            "updated_at": 1_700_000_000_123i64,
            "deleted_at": "2024-01-01T00:00:00Z",
            "expired_at": "1700000000123"
        });

        let attrs = flatten_item(&record, &defs);

        assert_eq!(attrs["created_at"], json!("2023-11-14T22:13:20Z"));
        assert_eq!(attrs["updated_at"], json!("2023-11-14T22:13:20Z"));
        assert_eq!(attrs["deleted_at"], json!("2024-01-01T00:00:00Z"));
        assert_eq!(attrs["expired_at"], json!("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn test_object_and_list_nesting() {
        let defs = fields(json!([
            {"name": "ipgroup", "kind": "object", "fields": [
                {"name": "ipgroup_id"},
                {"name": "enable_ipgroup", "kind": "bool"}
            ]},
            {"name": "members", "kind": "list", "fields": [
                {"name": "address"},
                {"name": "port", "path": "protocol_port", "kind": "int"}
            ]},
            {"name": "sni_container_refs", "kind": "string_list"}
        ]));
        let record = json!({
            "ipgroup": {"ipgroup_id": "ig-1", "enable_ipgroup": false},
            "members": [{"address": "10.0.0.1", "protocol_port": 80}, "junk"],
            "sni_container_refs": ["c-1", 7, "c-2"]
        });

        let attrs = flatten_item(&record, &defs);

        assert_eq!(attrs["ipgroup"], json!([{"ipgroup_id": "ig-1", "enable_ipgroup": false}]));
        assert_eq!(attrs["members"], json!([{"address": "10.0.0.1", "port": 80}]));
        assert_eq!(attrs["sni_container_refs"], json!(["c-1", "c-2"]));
    }
}
