//! Wildcard hostname patterns
//!
//! A pattern contains exactly one `*`, and that `*` must be a whole
//! dot-delimited label. It stands for any single non-empty label, so the
//! candidate name must have the same number of labels as the pattern.
//!
//! # Supported patterns
//! - `*.lan` - matches `nas.lan`, `printer.lan`
//! - `*.home.example` - matches `app.home.example`
//! - `api.*.example` - matches `api.eu.example`
//!
//! # Unsupported patterns (will be rejected)
//! - `**.lan` or `*.*.lan` - more than one wildcard
//! - `api-*.lan` - wildcard inside a label
//! - `*` - bare asterisk
//! - `*..lan` - empty label

use thiserror::Error;

const WILDCARD_LABEL: &str = "*";

/// Errors that can occur while parsing a wildcard pattern
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WildcardError {
    #[error("Empty pattern")]
    EmptyPattern,

    #[error("Bare asterisk (*) is not a valid pattern")]
    BareAsterisk,

    #[error("Pattern contains no wildcard label")]
    NoWildcard,

    #[error("Only one wildcard label is supported")]
    MultipleWildcards,

    #[error("Wildcard must replace a whole label, found {0:?}")]
    PartialLabel(String),

    #[error("Domain labels cannot be empty")]
    EmptyLabel,
}

/// A validated single-label wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WildcardPattern {
    pattern: String,
    labels: Vec<String>,
    wildcard_index: usize,
}

impl WildcardPattern {
    /// Parse and validate a wildcard pattern
    ///
    /// The pattern is lowercased; a trailing dot is ignored.
    ///
    /// # Examples
    /// ```
    /// use edgeway_router::wildcard::WildcardPattern;
    ///
    /// let pattern = WildcardPattern::parse("*.lan").unwrap();
    /// assert!(pattern.matches("nas.lan"));
    /// assert!(!pattern.matches("a.b.lan"));
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, WildcardError> {
        let normalized = crate::host::normalize_name(pattern);

        if normalized.is_empty() {
            return Err(WildcardError::EmptyPattern);
        }
        if normalized == WILDCARD_LABEL {
            return Err(WildcardError::BareAsterisk);
        }

        let labels: Vec<String> = normalized.split('.').map(str::to_string).collect();
        let mut wildcard_index = None;

        for (index, label) in labels.iter().enumerate() {
            if label.is_empty() {
                return Err(WildcardError::EmptyLabel);
            }
            if label == WILDCARD_LABEL {
                if wildcard_index.replace(index).is_some() {
                    return Err(WildcardError::MultipleWildcards);
                }
            } else if label.contains('*') {
                if label.matches('*').count() > 1 {
                    return Err(WildcardError::MultipleWildcards);
                }
                return Err(WildcardError::PartialLabel(label.clone()));
            }
        }

        let wildcard_index = wildcard_index.ok_or(WildcardError::NoWildcard)?;

        Ok(Self {
            pattern: normalized,
            labels,
            wildcard_index,
        })
    }

    /// Check whether a normalized hostname matches this pattern
    ///
    /// The wildcard label matches exactly one non-empty label, never zero and
    /// never several.
    pub fn matches(&self, hostname: &str) -> bool {
        let mut count = 0;
        for (index, label) in hostname.split('.').enumerate() {
            count += 1;
            if count > self.labels.len() || label.is_empty() {
                return false;
            }
            if index != self.wildcard_index && label != self.labels[index] {
                return false;
            }
        }
        count == self.labels.len()
    }

    /// Get the full (normalized) pattern string
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Check whether a host string should be treated as a wildcard pattern
    pub fn is_wildcard_pattern(host: &str) -> bool {
        host.contains('*')
    }
}

impl std::fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern)
    }
}
