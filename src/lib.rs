//! Declarative data sources and resources for Huawei Cloud.
//!
//! - [`pager`] - offset and marker pagination over collection endpoints
//! - [`resource`] - embedded definitions, data source reads, resource dispatch
//! - [`provider`] - region and project resolution, batch reads
//! - [`cloud`] - HTTP, IAM tokens, service endpoints, errors
//! - [`config`] - provider configuration

pub mod cloud;
pub mod config;
pub mod field_path;
pub mod pager;
pub mod provider;
pub mod resource;

pub use config::Config;
pub use provider::{DataSourceRequest, Provider};
