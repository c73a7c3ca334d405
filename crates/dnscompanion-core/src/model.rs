//! Core data model shared by every component.
//!
//! Mirrors the tagged-variant record model: a single [`RecordType`] enum with
//! type-specific fields carried alongside rather than a dynamic "record shape" object.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The eight record types this system can manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Srv,
    Caa,
    Ns,
}

impl RecordType {
    /// Trailing-dot / apex equivalence applies to hostname-valued record content.
    pub fn content_is_hostname(self) -> bool {
        matches!(self, Self::Cname | Self::Mx | Self::Srv | Self::Ns)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Srv => "SRV",
            Self::Caa => "CAA",
            Self::Ns => "NS",
        };
        f.write_str(s)
    }
}

/// Type-specific extra fields carried alongside the common record fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordExtras {
    /// MX, SRV priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    /// SRV weight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    /// SRV port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// CAA flags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u8>,
    /// CAA tag (issue, issuewild, iodef)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Canonical internal record, as known (or about to be known) to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned id; absent until the record has been created upstream.
    pub external_id: Option<String>,
    pub provider_id: String,
    pub record_type: RecordType,
    /// Fully-qualified hostname, lowercase, no trailing dot (internal representation).
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub extras: RecordExtras,
    /// Cloudflare-only (or similar) proxy flag; ignored by providers that don't support it.
    pub proxied: Option<bool>,
    /// Whether this record carries the provider's ownership marker (§4.1
    /// `SupportsOwnershipMarker`). Meaningless — and always `true` — for providers that
    /// don't support markers at all; the reaper only consults this when
    /// `supports_ownership_marker()` is true.
    pub owned: bool,
}

impl DnsRecord {
    pub fn key(&self) -> (RecordType, String) {
        (self.record_type, normalize_name(&self.name))
    }
}

/// Where a desired record's hostname was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredSource {
    Traefik,
    Direct,
    Managed,
    Api,
}

/// What the reconciler wants to exist for one `(type, name)` at one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredRecord {
    pub provider_id: String,
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub extras: RecordExtras,
    pub proxied: Option<bool>,
    pub source: DesiredSource,
    /// Content must be filled from the host's current public IPv4 before submission.
    pub needs_public_ipv4: bool,
    /// Content must be filled from the host's current public IPv6 before submission.
    pub needs_public_ipv6: bool,
}

impl DesiredRecord {
    pub fn key(&self) -> (RecordType, String) {
        (self.record_type, normalize_name(&self.name))
    }

    pub fn has_pending_lookup(&self) -> bool {
        self.needs_public_ipv4 || self.needs_public_ipv6
    }
}

/// Lowercases and strips a single trailing dot, for `(type, name)` keys and comparisons.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    lower.strip_suffix('.').map(str::to_string).unwrap_or(lower)
}

/// Strips a single trailing dot from hostname-valued content (CNAME/MX/SRV/NS targets).
pub fn normalize_hostname_content(content: &str) -> String {
    normalize_name(content)
}

/// Returns true if `name` is the apex of `zone` (either the bare zone itself or `@`).
pub fn is_apex(name: &str, zone: &str) -> bool {
    let name = normalize_name(name);
    name == "@" || name == normalize_name(zone)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
}

/// A registered DNS provider instance and its managed zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub id: String,
    pub display_name: String,
    pub provider_type: String,
    /// Opaque credential blob; never logged. Shape is provider-specific.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    /// The zone/domain this provider manages.
    pub zone: String,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub default: bool,
}

/// An exact or leading-wildcard hostname pattern the orphan reaper must never delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservedHostname(pub String);

impl PreservedHostname {
    /// Wildcard patterns match exactly one leading label (`*.a.b` matches `x.a.b`, not `x.y.a.b`).
    pub fn matches(&self, hostname: &str) -> bool {
        let hostname = normalize_name(hostname);
        let pattern = self.0.to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(rest) => match hostname.split_once('.') {
                Some((_, tail)) => tail == rest,
                None => false,
            },
            None => hostname == pattern,
        }
    }
}

/// A hostname the operator declares must always exist, regardless of container state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedHostname {
    pub name: String,
    pub record_type: RecordType,
    pub content: String,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub extras: RecordExtras,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_name_strips_dot_and_lowercases() {
        assert_eq!(normalize_name("Foo.EXAMPLE.com."), "foo.example.com");
        assert_eq!(normalize_name("foo.example.com"), "foo.example.com");
    }

    #[test]
    fn apex_matches_bare_zone_and_at_sign() {
        assert!(is_apex("example.com", "example.com"));
        assert!(is_apex("@", "example.com"));
        assert!(!is_apex("www.example.com", "example.com"));
    }

    #[test]
    fn preserved_hostname_wildcard_is_single_label() {
        let p = PreservedHostname("*.admin.example.com".to_string());
        assert!(p.matches("x.admin.example.com"));
        assert!(!p.matches("x.y.admin.example.com"));
        assert!(!p.matches("admin.example.com"));
    }

    #[test]
    fn preserved_hostname_exact_match() {
        let p = PreservedHostname("api.example.com".to_string());
        assert!(p.matches("API.example.com"));
        assert!(!p.matches("www.example.com"));
    }
}
