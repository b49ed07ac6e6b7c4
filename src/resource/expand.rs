//! Expanding attributes into requests
//!
//! Query filters, request bodies and URL path parameters are all built from
//! the caller's attribute map.

use super::state::Attributes;
use crate::field_path::FieldPath;
use crate::pager::QueryParams;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("missing required attribute `{0}`")]
    MissingAttribute(String),
    #[error("attribute `{attr}` must be \"true\" or \"false\", got {value}")]
    InvalidBool { attr: String, value: String },
    #[error("attribute `{0}` must be an integer")]
    InvalidInt(String),
    #[error("attribute `{0}` must be a scalar or a list of scalars")]
    InvalidValue(String),
    #[error("body path `{0}` must be a plain dotted path")]
    InvalidBodyPath(String),
    #[error("attribute `{0}` must be an object or a list holding one object")]
    InvalidBlock(String),
    #[error("attribute `{attr}` must be one of {allowed:?}, got {value}")]
    InvalidChoice {
        attr: String,
        value: String,
        allowed: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    String,
    Int,
    Bool,
}

/// Attribute sent as a query parameter
#[derive(Debug, Clone, Deserialize)]
pub struct FilterDef {
    pub attr: String,
    /// Query parameter name; defaults to the attribute name
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub kind: FilterKind,
}

impl FilterDef {
    pub fn param(&self) -> &str {
        self.param.as_deref().unwrap_or(&self.attr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    /// Attribute value copied as-is
    #[default]
    Value,
    /// String attribute holding JSON, sent parsed
    JsonString,
    /// Block expanded through its own `fields`; a one-element list is unwrapped
    Object,
}

/// Attribute placed into a request body
#[derive(Debug, Clone, Deserialize)]
pub struct BodyField {
    pub attr: String,
    /// Dotted location in the body; defaults to the attribute name
    #[serde(default)]
    pub path: Option<FieldPath>,
    #[serde(default)]
    pub kind: BodyKind,
    /// Child fields of an `object` block, looked up inside the block
    #[serde(default)]
    pub fields: Vec<BodyField>,
}

/// Build query parameters from filter definitions, in declaration order.
/// `enterprise_project_id` is appended last unless the caller set it.
pub fn build_query(
    filters: &[FilterDef],
    attrs: &Attributes,
    enterprise_project_id: Option<&str>,
) -> Result<QueryParams, ExpandError> {
    let mut query = QueryParams::new();

    for filter in filters {
        let Some(value) = attrs.get(&filter.attr).filter(|v| !v.is_null()) else {
            continue;
        };
        let values = match value {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            single => vec![single],
        };
        for value in values {
            query.push(filter.param(), filter_value(filter, value)?);
        }
    }

    if let Some(eps_id) = enterprise_project_id.filter(|id| !id.is_empty()) {
        if !query.contains_key("enterprise_project_id") {
            query.push("enterprise_project_id", eps_id);
        }
    }

    Ok(query)
}

fn filter_value(filter: &FilterDef, value: &Value) -> Result<String, ExpandError> {
    match filter.kind {
        FilterKind::String => match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(ExpandError::InvalidValue(filter.attr.clone())),
        },
        FilterKind::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
            Value::String(s) if s.parse::<i64>().is_ok() => Ok(s.clone()),
            _ => Err(ExpandError::InvalidInt(filter.attr.clone())),
        },
        FilterKind::Bool => match value {
            Value::Bool(b) => Ok(b.to_string()),
            Value::String(s) if s == "true" || s == "false" => Ok(s.clone()),
            other => Err(ExpandError::InvalidBool {
                attr: filter.attr.clone(),
                value: other.to_string(),
            }),
        },
    }
}

/// Build a request body. Absent attributes are left out entirely.
pub fn build_body(fields: &[BodyField], attrs: &Attributes) -> Result<Value, ExpandError> {
    expand_fields(fields, attrs).map(Value::Object)
}

fn expand_fields(fields: &[BodyField], attrs: &Attributes) -> Result<Map<String, Value>, ExpandError> {
    let mut body = Map::new();

    for field in fields {
        let Some(value) = attrs.get(&field.attr).filter(|v| !v.is_null()) else {
            continue;
        };
        let Some(value) = expand_value(field, value)? else {
            continue;
        };

        let keys = match &field.path {
            Some(path) => path
                .keys()
                .filter(|keys| !keys.is_empty())
                .ok_or_else(|| ExpandError::InvalidBodyPath(path.to_string()))?,
            None => vec![field.attr.as_str()],
        };
        insert_nested(&mut body, &keys, value);
    }

    Ok(body)
}

/// Body value of one present attribute; `None` leaves the key out
fn expand_value(field: &BodyField, value: &Value) -> Result<Option<Value>, ExpandError> {
    match field.kind {
        BodyKind::Value => Ok(Some(value.clone())),
        BodyKind::JsonString => match value {
            Value::String(raw) if raw.trim().is_empty() => Ok(None),
            Value::String(raw) => match serde_json::from_str(raw) {
                Ok(parsed) => Ok(Some(parsed)),
                Err(e) => {
                    tracing::warn!("error parsing {} as JSON, leaving it out: {}", field.attr, e);
                    Ok(None)
                }
            },
            other => Ok(Some(other.clone())),
        },
        BodyKind::Object => {
            let block = match value {
                Value::Object(block) => block,
                Value::Array(items) => match items.as_slice() {
                    [] | [Value::Null] => return Ok(None),
                    [Value::Object(block)] => block,
                    _ => return Err(ExpandError::InvalidBlock(field.attr.clone())),
                },
                _ => return Err(ExpandError::InvalidBlock(field.attr.clone())),
            };
            let expanded = expand_fields(&field.fields, block)?;
            Ok((!expanded.is_empty()).then_some(Value::Object(expanded)))
        }
    }
}

fn insert_nested(body: &mut Map<String, Value>, keys: &[&str], value: Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = body;
    for key in parents {
        let entry = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

/// Names of the `{placeholders}` in a URL template, other than `project_id`
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + 1 + len];
        if name != "project_id" && !names.contains(&name) {
            names.push(name);
        }
        rest = &rest[start + 2 + len..];
    }
    names
}

/// Values for every placeholder of `template`. `fixed` wins over attributes.
pub fn path_params(
    template: &str,
    attrs: &Attributes,
    fixed: &[(&str, &str)],
) -> Result<Vec<(String, String)>, ExpandError> {
    placeholders(template)
        .into_iter()
        .map(|name| {
            if let Some((_, value)) = fixed.iter().find(|(key, _)| *key == name) {
                return Ok((name.to_string(), value.to_string()));
            }
            match attrs.get(name) {
                Some(Value::String(s)) if !s.is_empty() => Ok((name.to_string(), s.clone())),
                Some(Value::Number(n)) => Ok((name.to_string(), n.to_string())),
                _ => Err(ExpandError::MissingAttribute(name.to_string())),
            }
        })
        .collect()
}
