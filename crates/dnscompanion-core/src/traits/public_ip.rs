// # Public IP Source Trait
//
// Resolves the host's current public IPv4/IPv6 for the `HostnameResolver`'s pending-lookup
// fill (§4.5, §4.11, §6). Never blocks the reconcile pass: if no value has been resolved
// yet, the caller treats the pending lookup as `NoPublicIP`, not a blocking wait.
//
// ## Implementations
//
// - Static override + HTTP polling: `dnscompanion-discovery-publicip` crate

use std::net::IpAddr;

/// Non-blocking accessor for the host's last-known public IP addresses.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP I/O to external IP-echo services
/// - ⚠️ Spawn a background polling task at the configured refresh interval
///
/// ## Forbidden Capabilities
/// - ❌ Block the reconcile pass waiting for a fresh value
/// - ❌ Implement retry/backoff beyond its own polling loop
pub trait PublicIpSource: Send + Sync {
    /// Last-known public IPv4, if any has been resolved yet.
    fn current_v4(&self) -> Option<IpAddr>;

    /// Last-known public IPv6, if any has been resolved yet.
    fn current_v6(&self) -> Option<IpAddr>;
}
