//! Dynatrace metrics datasource backend.
//!
//! Translates dashboard queries into Dynatrace Metrics API v2 requests and
//! reshapes the nested results into flat, labeled time series.

pub mod api;
pub mod client;
pub mod config;
pub mod datasource;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod query;

pub use datasource::Datasource;
pub use error::{DatasourceError, Result};
