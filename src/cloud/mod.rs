//! Huawei Cloud API interaction module
//!
//! Everything needed to talk to a service endpoint: authentication, endpoint
//! resolution, HTTP verbs and typed errors.
//!
//! # Module Structure
//!
//! - [`auth`] - IAM tokens (pre-issued or password-based, cached per region)
//! - [`catalog`] - Service type to endpoint host mapping
//! - [`client`] - Region-bound service client
//! - [`error`] - Typed errors and display helpers
//! - [`http`] - HTTP utilities for REST API calls
//! - [`projects`] - Region to project ID lookups
//!
//! # Example
//!
//! ```ignore
//! use hwcloud_provider::cloud::client::ServiceClient;
//!
//! async fn example(client: &ServiceClient) -> anyhow::Result<()> {
//!     let url = client.url_for("v1/{project_id}/eventstreamings", &[]);
//!     let streams = client.get(&url).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod catalog;
pub mod client;
pub mod error;
pub mod http;
pub mod projects;

pub use client::ServiceClient;
pub use error::{find_cloud_error, format_error, CloudError};
