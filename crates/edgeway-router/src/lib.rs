//! Hostname routing for the edge router
//!
//! A [`RoutingTable`] is compiled once from configuration and shared by the DNS
//! and HTTP front ends. Lookups try exact hostnames first and then single-label
//! wildcard patterns (e.g., `*.lan`) in registration order.

pub mod host;
pub mod route;
pub mod table;
pub mod wildcard;

pub use host::{is_direct_ip, normalize_host, normalize_name, strip_port};
pub use route::{Destination, Route, RouteError, RouteKind, RouteMeta};
pub use table::{RoutingTable, RoutingTableBuilder, SkippedRoute};
pub use wildcard::{WildcardError, WildcardPattern};
