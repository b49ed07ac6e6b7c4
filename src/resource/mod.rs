//! Resource abstraction layer
//!
//! Data sources and managed resources are described declaratively. The
//! definitions are loaded from JSON files at compile time, so a new data
//! source usually needs no code at all.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches definitions from embedded JSON
//! - [`fetcher`] - Reads data sources through the pagers
//! - [`dispatch`] - Create / read / update / delete of managed resources
//! - [`expand`] - Attributes to query parameters, bodies and path parameters
//! - [`flatten`] - API records to attributes
//!
//! # Definitions
//!
//! Definitions live under `src/resources/`, one file per service:
//! - `elb.json` - listeners, L7 policies, load balancers (live and in the
//!   recycle bin), security policies
//! - `eg.json` - connections and event streams
//! - `live.json` - OTT channels
//! - `workspace.json`, `dms.json`, `iotda.json`, `secmaster.json`
//!
//! # Example
//!
//! ```ignore
//! use hwcloud_provider::resource::{get_data_source, read_data_source};
//!
//! async fn listeners(client: &ServiceClient) -> anyhow::Result<Vec<serde_json::Value>> {
//!     let def = get_data_source("elb_listeners").unwrap();
//!     read_data_source(client, def, &Attributes::new(), None).await
//! }
//! ```

pub mod dispatch;
pub mod expand;
mod fetcher;
pub mod flatten;
mod registry;
mod state;

pub use fetcher::{fetch_records, read_data_source};
pub use registry::*;
pub use state::{Attributes, Diagnostic, ReadOutcome, State};
