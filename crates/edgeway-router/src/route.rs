//! HTTP route model

use crate::wildcard::WildcardError;
use thiserror::Error;
use url::Url;

/// Route construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Route host is empty")]
    EmptyHost,

    #[error("Route target is empty")]
    EmptyTarget,

    #[error("Invalid target URL {url:?}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("Unsupported target scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("Invalid wildcard pattern: {0}")]
    InvalidWildcardPattern(#[from] WildcardError),

    #[error("Route already exists: {0}")]
    RouteAlreadyExists(String),

    #[error("Invalid address {0:?}")]
    InvalidAddress(String),
}

/// How a matched request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteKind {
    #[default]
    Proxy,
    Redirect,
}

/// Validated route destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Reverse proxy (or tunnel, on upgrade) to this base URL
    Proxy(Url),
    /// 302 to this literal prefix; the request path and query are appended
    Redirect(String),
}

/// Display metadata consumed by the menu page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMeta {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub category: Option<String>,
}

impl RouteMeta {
    /// True when every display field is present and non-empty
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.description, &self.icon, &self.category]
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// One configured host binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub host: String,
    pub destination: Destination,
    pub meta: RouteMeta,
}

impl Route {
    /// Validate a host/target pair into a route
    pub fn new(host: &str, kind: RouteKind, target: &str) -> Result<Self, RouteError> {
        let host = crate::host::normalize_name(host);
        if host.is_empty() {
            return Err(RouteError::EmptyHost);
        }

        let target = target.trim();
        if target.is_empty() {
            return Err(RouteError::EmptyTarget);
        }

        let parsed = Url::parse(target).map_err(|e| RouteError::InvalidTarget {
            url: target.to_string(),
            reason: e.to_string(),
        })?;

        let destination = match kind {
            RouteKind::Proxy => {
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(RouteError::UnsupportedScheme(parsed.scheme().to_string()));
                }
                if parsed.host_str().is_none() {
                    return Err(RouteError::InvalidTarget {
                        url: target.to_string(),
                        reason: "missing host".to_string(),
                    });
                }
                Destination::Proxy(parsed)
            }
            RouteKind::Redirect => Destination::Redirect(target.to_string()),
        };

        Ok(Self {
            host,
            destination,
            meta: RouteMeta::default(),
        })
    }

    pub fn with_meta(mut self, meta: RouteMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn kind(&self) -> RouteKind {
        match self.destination {
            Destination::Proxy(_) => RouteKind::Proxy,
            Destination::Redirect(_) => RouteKind::Redirect,
        }
    }

    /// Target as configured, for logging
    pub fn target(&self) -> &str {
        match &self.destination {
            Destination::Proxy(url) => url.as_str(),
            Destination::Redirect(target) => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_route() {
        let route = Route::new("App.LAN", RouteKind::Proxy, "http://10.0.0.5:3000").unwrap();
        assert_eq!(route.host, "app.lan");
        assert_eq!(route.kind(), RouteKind::Proxy);
        match &route.destination {
            Destination::Proxy(url) => assert_eq!(url.port(), Some(3000)),
            other => panic!("unexpected destination {other:?}"),
        }
    }

    #[test]
    fn test_redirect_keeps_literal_target() {
        let route = Route::new("r.example", RouteKind::Redirect, "https://real.example").unwrap();
        assert_eq!(
            route.destination,
            Destination::Redirect("https://real.example".to_string())
        );
        assert_eq!(route.target(), "https://real.example");
    }

    #[test]
    fn test_invalid_routes() {
        assert_eq!(
            Route::new("", RouteKind::Proxy, "http://x").unwrap_err(),
            RouteError::EmptyHost
        );
        assert_eq!(
            Route::new("a.lan", RouteKind::Proxy, " ").unwrap_err(),
            RouteError::EmptyTarget
        );
        assert!(matches!(
            Route::new("a.lan", RouteKind::Proxy, "not a url").unwrap_err(),
            RouteError::InvalidTarget { .. }
        ));
        assert_eq!(
            Route::new("a.lan", RouteKind::Proxy, "ftp://files.lan").unwrap_err(),
            RouteError::UnsupportedScheme("ftp".to_string())
        );
    }

    #[test]
    fn test_meta_completeness() {
        let mut meta = RouteMeta {
            name: Some("App".into()),
            description: Some("Main app".into()),
            icon: Some("monitor".into()),
            category: Some("Services".into()),
        };
        assert!(meta.is_complete());

        meta.icon = Some(String::new());
        assert!(!meta.is_complete());

        assert!(!RouteMeta::default().is_complete());
    }
}
