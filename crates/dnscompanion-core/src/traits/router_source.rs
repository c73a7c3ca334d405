// # Router Source Trait
//
// Defines the interface for discovering hostnames from a reverse-proxy's routing rules
// (traefik mode only; see §4.4).
//
// ## Implementations
//
// - Traefik HTTP API: `dnscompanion-discovery-traefik` crate
//
// ## Usage
//
// ```rust,ignore
// use dnscompanion_core::RouterSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* RouterSource implementation */;
//     let hostnames = source.poll().await?;
//     Ok(())
// }
// ```

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Trait for reverse-proxy router discovery implementations.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform authenticated HTTP I/O against the routing proxy's API
/// - ✅ Extract and validate hostnames via regex over `Host(...)`/`HostRegexp(...)` rules
///
/// ## Forbidden Capabilities
/// - ❌ Merge results with container labels (use `HostnameResolver`)
/// - ❌ Talk to any DNS provider
/// - ❌ Implement polling cadence beyond the configured interval (owned by `Scheduler`)
///
/// See `docs/architecture/TRUST_LEVELS.md` for complete trust level definitions.
#[async_trait]
pub trait RouterSource: Send + Sync {
    /// Fetch the current router list and return the validated hostname set.
    ///
    /// Must skip routers whose provider label marks them internal, and discard any
    /// extracted literal that does not satisfy the strict-FQDN rule in §4.4.
    async fn poll(&self) -> Result<HashSet<String>>;
}
