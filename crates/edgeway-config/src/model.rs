//! YAML configuration model

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Resolver consulted for names without a local entry
pub const DEFAULT_UPSTREAM: &str = "1.1.1.1:53";

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Host that always serves the menu page
    #[serde(default)]
    pub menu: Option<String>,

    /// HTML file served as the menu/fallback page
    #[serde(default = "default_menu_page")]
    pub menu_page: PathBuf,

    /// Grace period for in-flight work on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    /// HTTP routes, in priority order for wildcard patterns
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

fn default_listen() -> String {
    "0.0.0.0:80".to_string()
}

fn default_menu_page() -> PathBuf {
    PathBuf::from("./menu.html")
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            menu: None,
            menu_page: default_menu_page(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            telemetry: TelemetryConfig::default(),
            dns: DnsConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a YAML document and validate it
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields the servers cannot start without
    ///
    /// Individual routes and domains are not validated here; bad entries are
    /// skipped when the routing tables are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        self.dns.listen_addr()?;
        self.dns.upstream_addr()?;
        if self.dns.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "dns.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("listen", &self.listen)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// DNS responder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_listen")]
    pub listen: String,

    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Upstream exchange timeout
    #[serde(default = "default_dns_timeout")]
    pub timeout_ms: u64,

    /// TTL of locally synthesized answers
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Ordered `pattern -> IPv4` map
    #[serde(default)]
    pub domains: serde_yaml::Mapping,
}

fn default_dns_listen() -> String {
    "0.0.0.0:53".to_string()
}

fn default_upstream() -> String {
    DEFAULT_UPSTREAM.to_string()
}

fn default_dns_timeout() -> u64 {
    3000
}

fn default_ttl() -> u32 {
    60
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: default_dns_listen(),
            upstream: default_upstream(),
            timeout_ms: default_dns_timeout(),
            ttl: default_ttl(),
            domains: serde_yaml::Mapping::new(),
        }
    }
}

impl DnsConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("dns.listen", &self.listen)
    }

    pub fn upstream_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("dns.upstream", &self.upstream)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where log lines are written
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
}

impl From<String> for LogOutput {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "stdout" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            _ => LogOutput::File(PathBuf::from(value)),
        }
    }
}

impl From<LogOutput> for String {
    fn from(value: LogOutput) -> Self {
        match value {
            LogOutput::Stdout => "stdout".to_string(),
            LogOutput::Stderr => "stderr".to_string(),
            LogOutput::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub output: LogOutput,

    /// Filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::default(),
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// A single route definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteConfig {
    pub host: String,

    pub target: String,

    /// `proxy` (default) or `redirect`
    #[serde(default)]
    pub kind: RouteKindConfig,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKindConfig {
    #[default]
    Proxy,
    Redirect,
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{field} {value:?} is not a socket address: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
listen: "127.0.0.1:8080"
menu: menu.lan
telemetry:
  output: stderr
  level: debug
  format: json
dns:
  listen: "127.0.0.1:5353"
  upstream: "9.9.9.9:53"
  timeout_ms: 500
  domains:
    "nas.lan": "192.168.1.2"
    "*.lan": "192.168.1.10"
routes:
  - host: app.lan
    target: http://10.0.0.5:3000
    name: App
    description: Main app
    icon: monitor
    category: Services
  - host: docs.lan
    target: https://docs.example
    kind: redirect
"#;

        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.menu.as_deref(), Some("menu.lan"));
        assert_eq!(config.telemetry.output, LogOutput::Stderr);
        assert_eq!(config.telemetry.format, LogFormat::Json);
        assert_eq!(config.dns.upstream_addr().unwrap().port(), 53);
        assert_eq!(config.dns.timeout(), Duration::from_millis(500));
        assert_eq!(config.dns.domains.len(), 2);
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[0].kind, RouteKindConfig::Proxy);
        assert_eq!(config.routes[1].kind, RouteKindConfig::Redirect);
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.listen, "0.0.0.0:80");
        assert_eq!(config.dns.listen, "0.0.0.0:53");
        assert_eq!(config.dns.upstream, DEFAULT_UPSTREAM);
        assert_eq!(config.dns.ttl, 60);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(config.menu_page, PathBuf::from("./menu.html"));
        assert_eq!(config.telemetry.output, LogOutput::Stdout);
        assert_eq!(config.telemetry.level, "info");
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_log_output_file() {
        let config = Config::parse("telemetry:\n  output: /var/log/edgeway.log\n").unwrap();
        assert_eq!(
            config.telemetry.output,
            LogOutput::File(PathBuf::from("/var/log/edgeway.log"))
        );
    }

    #[test]
    fn test_invalid_addresses() {
        let err = Config::parse("listen: not-an-address\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::parse("dns:\n  upstream: 1.1.1.1\n").unwrap_err();
        assert!(err.to_string().contains("dns.upstream"));

        let err = Config::parse("dns:\n  timeout_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = Config::parse("routes: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
