//! Hostname normalization helpers shared by the DNS and HTTP front ends

use std::net::IpAddr;

/// Lowercase a name and drop one trailing dot (`NAS.Lan.` -> `nas.lan`)
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    trimmed
        .strip_suffix('.')
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// Remove an optional `:port` suffix from an HTTP authority
///
/// Bracketed IPv6 literals lose their brackets (`[::1]:8080` -> `::1`). A bare
/// IPv6 literal with several colons is returned unchanged.
pub fn strip_port(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => authority,
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host
        }
        _ => authority,
    }
}

/// Normalize an HTTP `Host` value into a routing key
pub fn normalize_host(authority: &str) -> String {
    normalize_name(strip_port(authority.trim()))
}

/// Whether the request addressed the router by IP literal rather than by name
///
/// An empty host counts as direct access.
pub fn is_direct_ip(authority: &str) -> bool {
    let authority = authority.trim();
    if authority.is_empty() {
        return true;
    }
    strip_port(authority).parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("NAS.Lan."), "nas.lan");
        assert_eq!(normalize_name("nas.lan"), "nas.lan");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("10.0.0.1:80"), "10.0.0.1");
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("[fe80::1]"), "fe80::1");
        assert_eq!(strip_port("fe80::1"), "fe80::1");
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("App.LAN:8080"), "app.lan");
        assert_eq!(normalize_host("app.lan."), "app.lan");
    }

    #[test]
    fn test_direct_ip_detection() {
        assert!(is_direct_ip(""));
        assert!(is_direct_ip("192.168.1.1"));
        assert!(is_direct_ip("192.168.1.1:8080"));
        assert!(is_direct_ip("[::1]:80"));
        assert!(is_direct_ip("::1"));

        assert!(!is_direct_ip("app.lan"));
        assert!(!is_direct_ip("app.lan:8080"));
        // digits and dots alone do not make an address
        assert!(!is_direct_ip("1.2.3"));
        assert!(!is_direct_ip("999.1.1.1"));
    }
}
