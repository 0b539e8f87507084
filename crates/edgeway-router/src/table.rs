//! Immutable exact-then-wildcard routing table
//!
//! Lookup priority:
//! 1. Exact hostname match
//! 2. First wildcard pattern (in registration order) that matches
//! 3. Not found
//!
//! The table is built once and never mutated; share it behind an `Arc` and
//! swap the whole value to reconfigure.

use crate::host::normalize_name;
use crate::route::RouteError;
use crate::wildcard::WildcardPattern;
use std::collections::HashMap;
use std::fmt;
use tracing::{trace, warn};

/// A configuration entry left out of the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRoute {
    pub host: String,
    pub reason: String,
}

impl fmt::Display for SkippedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.host, self.reason)
    }
}

/// Hostname routing table, generic over the stored destination
#[derive(Debug, Clone)]
pub struct RoutingTable<T> {
    entries: Vec<(String, T)>,
    exact: HashMap<String, usize>,
    wildcards: Vec<(WildcardPattern, usize)>,
}

impl<T> Default for RoutingTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            exact: HashMap::new(),
            wildcards: Vec::new(),
        }
    }
}

impl<T> RoutingTable<T> {
    pub fn builder() -> RoutingTableBuilder<T> {
        RoutingTableBuilder {
            table: Self::default(),
            skipped: Vec::new(),
        }
    }

    /// Resolve a hostname (normalized here) to its destination
    pub fn resolve(&self, name: &str) -> Option<&T> {
        let name = normalize_name(name);
        if name.is_empty() {
            return None;
        }

        if let Some(&index) = self.exact.get(&name) {
            trace!(host = %name, "exact route match");
            return Some(&self.entries[index].1);
        }

        let found = self
            .wildcards
            .iter()
            .find(|(pattern, _)| pattern.matches(&name))
            .map(|(pattern, index)| {
                trace!(host = %name, pattern = %pattern, "wildcard route match");
                &self.entries[*index].1
            });

        if found.is_none() {
            trace!(host = %name, "no route");
        }
        found
    }

    /// Entries in registration order, keyed by their normalized host pattern
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(host, value)| (host.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects entries and records the ones that could not be registered
#[derive(Debug)]
pub struct RoutingTableBuilder<T> {
    table: RoutingTable<T>,
    skipped: Vec<SkippedRoute>,
}

impl<T> RoutingTableBuilder<T> {
    /// Register a host pattern; the first registration of a host wins
    pub fn insert(&mut self, host: &str, value: T) -> Result<(), RouteError> {
        let host = normalize_name(host);
        if host.is_empty() {
            return Err(RouteError::EmptyHost);
        }

        let index = self.table.entries.len();
        if WildcardPattern::is_wildcard_pattern(&host) {
            let pattern = WildcardPattern::parse(&host)?;
            if self.table.wildcards.iter().any(|(p, _)| *p == pattern) {
                return Err(RouteError::RouteAlreadyExists(host));
            }
            self.table.wildcards.push((pattern, index));
        } else {
            if self.table.exact.contains_key(&host) {
                return Err(RouteError::RouteAlreadyExists(host));
            }
            self.table.exact.insert(host.clone(), index);
        }

        self.table.entries.push((host, value));
        Ok(())
    }

    /// Register a validated entry, or record why it was rejected
    pub fn push(&mut self, host: &str, value: Result<T, RouteError>) {
        let result = value.and_then(|value| self.insert(host, value));
        if let Err(err) = result {
            self.skip(host, err);
        }
    }

    /// Record an entry that was rejected before reaching the table
    pub fn skip(&mut self, host: &str, reason: impl fmt::Display) {
        let reason = reason.to_string();
        warn!(host = %host, reason = %reason, "skipping route");
        self.skipped.push(SkippedRoute {
            host: host.to_string(),
            reason,
        });
    }

    pub fn build(self) -> (RoutingTable<T>, Vec<SkippedRoute>) {
        (self.table, self.skipped)
    }
}
