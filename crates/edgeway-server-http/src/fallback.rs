//! Fallback (menu) page
//!
//! Served for the menu host, for direct IP access and for hosts without a
//! route. `/api/services` lists the routes that carry display metadata.

use crate::{full, text_response, Body};
use async_trait::async_trait;
use edgeway_router::{Route, RoutingTable};
use http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{error, warn};

/// Path of the JSON service listing
pub const SERVICES_PATH: &str = "/api/services";

/// Renders the local page for requests that are not routed elsewhere
#[async_trait]
pub trait FallbackPage: Send + Sync {
    async fn render(&self, path: &str) -> Response<Body>;
}

/// One entry of the service listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icon: String,
    pub status: String,
    pub category: String,
}

/// HTML menu read from disk plus the service listing
pub struct MenuPage {
    page: PathBuf,
    services: Vec<ServiceInfo>,
}

impl MenuPage {
    /// Build the listing from routes that have every display field
    pub fn new(page: impl Into<PathBuf>, routes: &RoutingTable<Route>) -> Self {
        let services = routes
            .iter()
            .filter_map(|(host, route)| {
                let meta = &route.meta;
                if !meta.is_complete() {
                    warn!(host = %host, "route missing display fields, not listed on menu");
                    return None;
                }
                Some(ServiceInfo {
                    name: meta.name.clone().unwrap_or_default(),
                    description: meta.description.clone().unwrap_or_default(),
                    url: format!("http://{host}"),
                    icon: meta.icon.clone().unwrap_or_default(),
                    status: "active".to_string(),
                    category: meta.category.clone().unwrap_or_default(),
                })
            })
            .collect();

        Self {
            page: page.into(),
            services,
        }
    }

    pub fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    fn services_response(&self) -> Response<Body> {
        match serde_json::to_vec(&self.services) {
            Ok(json) => {
                let mut response = Response::new(full(json));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response
            }
            Err(e) => {
                error!("Error encoding services response: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    async fn page_response(&self) -> Response<Body> {
        match tokio::fs::read(&self.page).await {
            Ok(html) => {
                let mut response = Response::new(full(html));
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
                response
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(path = %self.page.display(), "Menu file not found");
                text_response(StatusCode::NOT_FOUND, "Menu file not found")
            }
            Err(e) => {
                error!(path = %self.page.display(), error = %e, "Error reading menu file");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Error reading menu file")
            }
        }
    }
}

#[async_trait]
impl FallbackPage for MenuPage {
    async fn render(&self, path: &str) -> Response<Body> {
        if path == SERVICES_PATH {
            self.services_response()
        } else {
            self.page_response().await
        }
    }
}
