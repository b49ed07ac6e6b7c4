//! Field paths into JSON responses
//!
//! Paths such as `page_info.next_marker`, `loadbalancers[0].id` or
//! `insert_headers."X-Forwarded-Host"` are parsed once, when definitions are
//! loaded, and then applied to response bodies without re-parsing.
//! A quoted segment is taken literally and may contain dots.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty segment in path `{0}`")]
    EmptySegment(String),
    #[error("unterminated quote in path `{0}`")]
    UnterminatedQuote(String),
    #[error("invalid index in path `{0}`")]
    InvalidIndex(String),
    #[error("unexpected character `{1}` in path `{0}`")]
    Unexpected(String, char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed path. The empty path addresses the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// The path addressing the root value
    pub fn root() -> Self {
        Self::default()
    }

    /// A single-key path; the key is taken literally
    pub fn key(name: &str) -> Self {
        let raw = if name.contains(['.', '[', '"']) {
            format!("\"{}\"", name)
        } else {
            name.to_string()
        };
        Self {
            raw,
            segments: vec![Segment::Key(name.to_string())],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the path against `value`
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Key(key) => current.get(key.as_str()),
                Segment::Index(idx) => current.get(*idx),
            })
    }

    /// Resolve the path against `value`, mutably
    pub fn lookup_mut<'a>(&self, value: &'a mut Value) -> Option<&'a mut Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Key(key) => current.get_mut(key.as_str()),
                Segment::Index(idx) => current.get_mut(*idx),
            })
    }

    /// Resolve the path and return the value as a string, if it is a string or number
    pub fn lookup_str(&self, value: &Value) -> Option<String> {
        match self.lookup(value)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Key segments of a plain dotted path, used to build nested request bodies
    pub fn keys(&self) -> Option<Vec<&str>> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Key(key) => Some(key.as_str()),
                Segment::Index(_) => None,
            })
            .collect()
    }
}

fn parse(raw: &str) -> Result<Vec<Segment>, PathError> {
    let mut segments = Vec::new();
    if raw.is_empty() {
        return Ok(segments);
    }

    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;

    loop {
        if chars.get(i) == Some(&'"') {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|c| *c == '"')
                .map(|p| start + p)
                .ok_or_else(|| PathError::UnterminatedQuote(raw.to_string()))?;
            segments.push(Segment::Key(chars[start..end].iter().collect()));
            i = end + 1;
        } else {
            let start = i;
            while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                i += 1;
            }
            if i > start {
                segments.push(Segment::Key(chars[start..i].iter().collect()));
            } else if chars.get(i) != Some(&'[') {
                return Err(PathError::EmptySegment(raw.to_string()));
            }
        }

        while chars.get(i) == Some(&'[') {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|c| *c == ']')
                .map(|p| start + p)
                .ok_or_else(|| PathError::InvalidIndex(raw.to_string()))?;
            let idx = chars[start..end]
                .iter()
                .collect::<String>()
                .parse::<usize>()
                .map_err(|_| PathError::InvalidIndex(raw.to_string()))?;
            segments.push(Segment::Index(idx));
            i = end + 1;
        }

        match chars.get(i) {
            None => break,
            Some('.') => {
                i += 1;
                if i == chars.len() {
                    return Err(PathError::EmptySegment(raw.to_string()));
                }
            }
            Some(c) => return Err(PathError::Unexpected(raw.to_string(), *c)),
        }
    }

    Ok(segments)
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            raw: raw.to_string(),
            segments: parse(raw)?,
        })
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let segments = parse(&raw)?;
        Ok(Self { raw, segments })
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        raw.parse().unwrap()
    }

    #[test]
    fn test_nested_keys_and_indexes() {
        let body = json!({
            "loadbalancers": [{"id": "lb-1"}, {"id": "lb-2"}],
            "quotas": {"resources": [1, 2, 3]}
        });
        assert_eq!(path("loadbalancers[1].id").lookup(&body), Some(&json!("lb-2")));
        assert_eq!(path("quotas.resources[2]").lookup(&body), Some(&json!(3)));
        assert_eq!(path("quotas.missing").lookup(&body), None);
        assert_eq!(path("loadbalancers[5].id").lookup(&body), None);
    }

    #[test]
    fn test_quoted_segment_may_contain_dots_and_dashes() {
        let body = json!({"insert_headers": {"X-Forwarded-ELB-ID": true, "a.b": 1}});
        assert_eq!(
            path(r#"insert_headers."X-Forwarded-ELB-ID""#).lookup(&body),
            Some(&json!(true))
        );
        assert_eq!(path(r#"insert_headers."a.b""#).lookup(&body), Some(&json!(1)));
    }

    #[test]
    fn test_root_path() {
        let body = json!([1, 2]);
        let root = path("");
        assert_eq!(root, FieldPath::root());
        assert_eq!(root.lookup(&body), Some(&body));
        assert_eq!(path("[0]").lookup(&body), Some(&json!(1)));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(matches!("a..b".parse::<FieldPath>(), Err(PathError::EmptySegment(_))));
        assert!(matches!("a.".parse::<FieldPath>(), Err(PathError::EmptySegment(_))));
        assert!(matches!(r#""abc"#.parse::<FieldPath>(), Err(PathError::UnterminatedQuote(_))));
        assert!(matches!("a[x]".parse::<FieldPath>(), Err(PathError::InvalidIndex(_))));
        assert!(matches!("a[0]b".parse::<FieldPath>(), Err(PathError::Unexpected(_, 'b'))));
    }

    #[test]
    fn test_single_key_constructor() {
        let body = json!({"a.b": 1});
        assert_eq!(FieldPath::key("a.b").lookup(&body), Some(&json!(1)));
        assert_eq!(FieldPath::key("a.b").as_str(), r#""a.b""#);
    }

    #[test]
    fn test_keys_of_dotted_path() {
        assert_eq!(path("security_policy.name").keys(), Some(vec!["security_policy", "name"]));
        assert_eq!(path("items[0]").keys(), None);
    }

    #[test]
    fn test_deserializes_from_string() {
        let parsed: FieldPath = serde_json::from_value(json!("page_info.next_marker")).unwrap();
        assert_eq!(parsed.as_str(), "page_info.next_marker");
        assert!(serde_json::from_value::<FieldPath>(json!("a..b")).is_err());
    }
}
