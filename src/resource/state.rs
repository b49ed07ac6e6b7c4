//! Results handed back to the caller

use crate::cloud::format_error;
use serde::Serialize;
use serde_json::{Map, Value};

/// Flat attribute map of a data source or resource
pub type Attributes = Map<String, Value>;

/// ID plus attributes of one data source read or one managed resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct State {
    pub id: String,
    pub attributes: Attributes,
}

impl State {
    pub fn new(id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attributes.get(attr)
    }
}

/// Outcome of reading a managed resource
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Present(State),
    /// The remote object no longer exists
    Gone,
}

impl ReadOutcome {
    pub fn into_state(self) -> Option<State> {
        match self {
            ReadOutcome::Present(state) => Some(state),
            ReadOutcome::Gone => None,
        }
    }
}

/// An error attached to one data source or resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Data source or resource the diagnostic belongs to
    pub target: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Diagnostic {
    /// Summary from the outermost context, detail from the full chain
    pub fn from_error(target: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            target: target.into(),
            summary: err.to_string(),
            detail: Some(format_error(err)),
        }
    }
}
