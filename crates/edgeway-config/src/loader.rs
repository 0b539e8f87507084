//! Load configuration from a file path or an HTTP(S) URL

use crate::{Config, ConfigError};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Location of the configuration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Path(PathBuf),
    Url(String),
}

impl ConfigSource {
    /// `http://` and `https://` values are URLs; anything else is a path
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            ConfigSource::Url(value.to_string())
        } else {
            ConfigSource::Path(PathBuf::from(value))
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Path(path) => write!(f, "{}", path.display()),
            ConfigSource::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Read, parse and validate a configuration document
pub async fn load(source: &ConfigSource) -> Result<Config, ConfigError> {
    info!(source = %source, "Loading configuration");

    let yaml = match source {
        ConfigSource::Path(path) => {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?
        }
        ConfigSource::Url(url) => fetch(url).await?,
    };

    debug!(bytes = yaml.len(), "Configuration read");
    Config::parse(&yaml)
}

async fn fetch(url: &str) -> Result<String, ConfigError> {
    let fetch_error = |reason: String| ConfigError::Fetch {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| fetch_error(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_error(e.to_string()))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(fetch_error(format!("HTTP {status}")));
    }

    response.text().await.map_err(|e| fetch_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_classification() {
        assert_eq!(
            ConfigSource::parse("https://config.lan/edge.yml"),
            ConfigSource::Url("https://config.lan/edge.yml".to_string())
        );
        assert_eq!(
            ConfigSource::parse("http://config.lan/edge.yml"),
            ConfigSource::Url("http://config.lan/edge.yml".to_string())
        );
        assert_eq!(
            ConfigSource::parse("./edge.yml"),
            ConfigSource::Path(PathBuf::from("./edge.yml"))
        );
        assert_eq!(
            ConfigSource::parse("httpd.yml"),
            ConfigSource::Path(PathBuf::from("httpd.yml"))
        );
    }
}
