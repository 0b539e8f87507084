//! Compile configuration into routing tables

use crate::model::{Config, DnsConfig, RouteConfig, RouteKindConfig};
use edgeway_router::{Route, RouteError, RouteKind, RouteMeta, RoutingTable, SkippedRoute};
use tracing::info;

/// Build the HTTP routing table; invalid routes are skipped and reported
pub fn http_table(config: &Config) -> (RoutingTable<Route>, Vec<SkippedRoute>) {
    let mut builder = RoutingTable::builder();
    for route in &config.routes {
        builder.push(&route.host, to_route(route));
    }

    let (table, skipped) = builder.build();
    info!(routes = table.len(), skipped = skipped.len(), "HTTP routing table built");
    (table, skipped)
}

/// Build the DNS table (`pattern -> address literal`)
///
/// Addresses are kept as written; one that is not an IPv4 literal fails
/// when an answer is synthesized for it.
pub fn dns_table(config: &DnsConfig) -> (RoutingTable<String>, Vec<SkippedRoute>) {
    let mut builder = RoutingTable::builder();
    for (key, value) in &config.domains {
        let Some(domain) = key.as_str() else {
            builder.skip(&format!("{key:?}"), "domain must be a string");
            continue;
        };

        let address = match value.as_str().map(str::trim) {
            Some("") | None => Err(RouteError::InvalidAddress(format!("{value:?}"))),
            Some(address) => Ok(address.to_string()),
        };
        builder.push(domain, address);
    }

    let (table, skipped) = builder.build();
    info!(domains = table.len(), skipped = skipped.len(), "DNS table built");
    (table, skipped)
}

fn to_route(config: &RouteConfig) -> Result<Route, RouteError> {
    let kind = match config.kind {
        RouteKindConfig::Proxy => RouteKind::Proxy,
        RouteKindConfig::Redirect => RouteKind::Redirect,
    };

    let meta = RouteMeta {
        name: config.name.clone(),
        description: config.description.clone(),
        icon: config.icon.clone(),
        category: config.category.clone(),
    };

    Ok(Route::new(&config.host, kind, &config.target)?.with_meta(meta))
}
