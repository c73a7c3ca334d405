// # Provider Client Trait
//
// Defines the interface every DNS provider adapter must implement.
//
// ## Implementations
//
// - Cloudflare: `dnscompanion-provider-cloudflare` crate
// - Future: any upstream exposing list/create/update/delete on a zone
//
// ## Usage
//
// ```rust,ignore
// use dnscompanion_core::ProviderClient;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* ProviderClient implementation */;
//     provider.init().await?;
//     let records = provider.list(None, None).await?;
//     Ok(())
// }
// ```

use crate::cache::RecordCache;
use crate::error::Result;
use crate::model::{DesiredRecord, DnsRecord, RecordType};
use async_trait::async_trait;

/// One Create or Update the Reconciler wants applied, paired with its outcome once applied.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub desired: DesiredRecord,
    pub existing_id: Option<String>,
}

/// Aggregate outcome of a [`ProviderClient::batch_apply`] call.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub applied: Vec<DnsRecord>,
    pub errors: Vec<(DesiredRecord, String)>,
}

/// Trait every DNS provider adapter must implement.
///
/// Owns its own [`RecordCache`]; all reads in steady state are served from cache and
/// refreshed on the policy described in §4.1 (explicit, scheduled, or on-demand).
///
/// # Trust Level: Untrusted
///
/// Provider adapters are **untrusted** components with the following capabilities:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/network I/O to the upstream provider API
/// - ✅ Maintain an in-memory [`RecordCache`] of the zone's records
/// - ✅ Translate between the internal record model and the provider's wire format
///
/// ## Forbidden Capabilities
/// - ❌ Decide *when* to reconcile (owned by the Reconciler)
/// - ❌ Implement cross-record batching order or concurrency caps (owned by the Reconciler)
/// - ❌ Implement retry logic (owned by the orchestrating Reconciler, see §5)
/// - ❌ Read container or router state directly
///
/// ## Rationale
///
/// Provider adapters need wide I/O access to talk to arbitrary upstream APIs, but must
/// not cross into reconciliation business logic. They are **executors**, not **planners**.
///
/// ## Examples
///
/// ✅ **CORRECT**: adapter reports a transient failure, lets the caller retry
/// ```rust,ignore
/// async fn update(&self, id: &str, desired: &DesiredRecord) -> Result<DnsRecord> {
///     self.http_put(id, desired).await.map_err(Error::from)
/// }
/// ```
///
/// ❌ **WRONG**: adapter sleeps and retries internally
/// ```rust,ignore
/// async fn update(&self, id: &str, desired: &DesiredRecord) -> Result<DnsRecord> {
///     loop {
///         match self.http_put(id, desired).await {
///             Ok(r) => return Ok(r),
///             Err(_) => tokio::time::sleep(Duration::from_secs(1)).await, // WRONG!
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable identifier matching the owning `ProviderRegistration.id`.
    fn provider_id(&self) -> &str;

    /// The zone/domain this instance manages, used by `ProviderRouter` for suffix matching.
    fn zone(&self) -> &str;

    /// The shared record cache for this provider.
    fn cache(&self) -> &RecordCache;

    /// Verify credentials, resolve zone id if only the zone name is known, refresh cache.
    ///
    /// Fails with `AuthError`, `ZoneNotFound`, or `Transport` on an unreachable upstream.
    async fn init(&self) -> Result<()>;

    /// Non-fatal health probe.
    async fn test_connection(&self) -> bool;

    /// Enumerate all records in the managed zone with pagination, normalize, and atomically
    /// replace the cache contents.
    async fn refresh_cache(&self) -> Result<Vec<DnsRecord>>;

    /// Served from cache.
    async fn list(&self, record_type: Option<RecordType>, name: Option<&str>) -> Result<Vec<DnsRecord>> {
        Ok(self.cache().list(record_type, name))
    }

    /// Cache lookup with per-provider name normalization (apex aliasing, trailing-dot).
    async fn find(&self, record_type: RecordType, name: &str) -> Result<Option<DnsRecord>> {
        Ok(self.cache().find(record_type, name, self.zone()))
    }

    /// Validate → translate → submit → insert into cache → return the normalized record.
    ///
    /// On an upstream "already exists" conflict, returns `Error::Conflict` rather than
    /// fabricating a record; the caller re-fetches and treats it as unchanged (testable
    /// scenario S7).
    async fn create(&self, desired: &DesiredRecord) -> Result<DnsRecord>;

    /// If the upstream rejects an unterminated FQDN for hostname-valued content, the
    /// implementation retries once with a trailing dot appended.
    async fn update(&self, external_id: &str, desired: &DesiredRecord) -> Result<DnsRecord>;

    /// Idempotent: deleting an unknown id returns success.
    async fn delete(&self, external_id: &str) -> Result<()>;

    /// Convenience wrapper running Create/Update in sequence; must not abort on a per-item
    /// failure.
    async fn batch_apply(&self, changes: Vec<PlannedChange>) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        for change in changes {
            let outcome = match change.existing_id {
                Some(id) => self.update(&id, &change.desired).await,
                None => self.create(&change.desired).await,
            };
            match outcome {
                Ok(record) => result.applied.push(record),
                Err(e) => result.errors.push((change.desired, e.to_string())),
            }
        }
        Ok(result)
    }

    /// Type-specific validation: A/AAAA address shape, MX priority, SRV priority/weight/port,
    /// CAA flags/tag, TTL within the provider's advertised bounds.
    fn validate(&self, desired: &DesiredRecord) -> Result<()>;

    /// Whether this provider allows attaching an immutable ownership marker to a record.
    fn supports_ownership_marker(&self) -> bool {
        false
    }
}
