//! Configuration for the edge router
//!
//! A single YAML document describes the HTTP routes, the DNS domain map, and
//! telemetry. It is read from a local path or fetched from an `http(s)://` URL.

pub mod loader;
pub mod model;
pub mod tables;

pub use loader::{load, ConfigSource};
pub use model::{
    Config, DnsConfig, LogFormat, LogOutput, RouteConfig, RouteKindConfig, TelemetryConfig,
    DEFAULT_UPSTREAM,
};
pub use tables::{dns_table, http_table};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch config from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
