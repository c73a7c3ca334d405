//! Shared test doubles for contract tests, mirroring the shape of call-count-tracking
//! mocks used across this workspace's unit tests.

use async_trait::async_trait;
use dnscompanion_core::{
    error::Result, BatchResult, DesiredRecord, DnsRecord, PlannedChange, ProviderClient,
    PublicIpSource, RecordCache,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A `ProviderClient` double with call counters, for contract tests that assert how
/// many times create/update/delete were invoked.
pub struct MockProviderClient {
    pub id: String,
    pub zone: String,
    pub cache: RecordCache,
    pub create_calls: Arc<AtomicUsize>,
    pub update_calls: Arc<AtomicUsize>,
    pub delete_calls: Arc<AtomicUsize>,
    next_id: AtomicUsize,
}

impl MockProviderClient {
    pub fn new(id: &str, zone: &str) -> Self {
        Self {
            id: id.to_string(),
            zone: zone.to_string(),
            cache: RecordCache::new(),
            create_calls: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(AtomicUsize::new(0)),
            delete_calls: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Shares call counters with another mock instance, for "restart simulation" tests.
    pub fn sharing_counters_with(mut self, other: &MockProviderClient) -> Self {
        self.create_calls = other.create_calls.clone();
        self.update_calls = other.update_calls.clone();
        self.delete_calls = other.delete_calls.clone();
        self
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn cache(&self) -> &RecordCache {
        &self.cache
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn refresh_cache(&self) -> Result<Vec<DnsRecord>> {
        Ok(self.cache.all())
    }

    async fn create(&self, desired: &DesiredRecord) -> Result<DnsRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let record = DnsRecord {
            external_id: Some(id),
            provider_id: self.id.clone(),
            record_type: desired.record_type,
            name: desired.name.clone(),
            content: desired.content.clone(),
            ttl: desired.ttl,
            extras: desired.extras.clone(),
            proxied: desired.proxied,
            owned: true,
        };
        self.cache.upsert(record.clone());
        Ok(record)
    }

    async fn update(&self, external_id: &str, desired: &DesiredRecord) -> Result<DnsRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let record = DnsRecord {
            external_id: Some(external_id.to_string()),
            provider_id: self.id.clone(),
            record_type: desired.record_type,
            name: desired.name.clone(),
            content: desired.content.clone(),
            ttl: desired.ttl,
            extras: desired.extras.clone(),
            proxied: desired.proxied,
            owned: true,
        };
        self.cache.upsert(record.clone());
        Ok(record)
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.cache.remove(external_id);
        Ok(())
    }

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

    fn validate(&self, _desired: &DesiredRecord) -> Result<()> {
        Ok(())
    }

    fn supports_ownership_marker(&self) -> bool {
        false
    }
}

/// A `ProviderClient` double whose `create()` always reports a conflict with a record
/// already sitting in its cache, exercising the re-read-on-conflict path (S7).
pub struct ConflictingProviderClient {
    pub zone: String,
    pub cache: RecordCache,
}

impl ConflictingProviderClient {
    pub fn new(zone: &str, existing: DnsRecord) -> Self {
        let cache = RecordCache::new();
        cache.upsert(existing);
        Self {
            zone: zone.to_string(),
            cache,
        }
    }
}

#[async_trait]
impl ProviderClient for ConflictingProviderClient {
    fn provider_id(&self) -> &str {
        "conflicting"
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn cache(&self) -> &RecordCache {
        &self.cache
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn refresh_cache(&self) -> Result<Vec<DnsRecord>> {
        Ok(self.cache.all())
    }

    async fn create(&self, _desired: &DesiredRecord) -> Result<DnsRecord> {
        Err(dnscompanion_core::error::Error::conflict(
            "record already exists",
        ))
    }

    async fn update(&self, external_id: &str, desired: &DesiredRecord) -> Result<DnsRecord> {
        let record = DnsRecord {
            external_id: Some(external_id.to_string()),
            provider_id: "conflicting".to_string(),
            record_type: desired.record_type,
            name: desired.name.clone(),
            content: desired.content.clone(),
            ttl: desired.ttl,
            extras: desired.extras.clone(),
            proxied: desired.proxied,
            owned: true,
        };
        self.cache.upsert(record.clone());
        Ok(record)
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        self.cache.remove(external_id);
        Ok(())
    }

    fn validate(&self, _desired: &DesiredRecord) -> Result<()> {
        Ok(())
    }

    fn supports_ownership_marker(&self) -> bool {
        false
    }
}

/// A `ProviderClient` double whose `create()` reports `Error::RateLimited` with a short
/// `retry_after` for its first `fail_times` calls, then succeeds — exercising the
/// retry-after-honoring path (S7-adjacent 429 handling).
pub struct FlakyRateLimitedProviderClient {
    pub zone: String,
    pub cache: RecordCache,
    pub fail_times: usize,
    pub retry_after: std::time::Duration,
    pub attempts: AtomicUsize,
}

impl FlakyRateLimitedProviderClient {
    pub fn new(zone: &str, fail_times: usize, retry_after: std::time::Duration) -> Self {
        Self {
            zone: zone.to_string(),
            cache: RecordCache::new(),
            fail_times,
            retry_after,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProviderClient for FlakyRateLimitedProviderClient {
    fn provider_id(&self) -> &str {
        "flaky"
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn cache(&self) -> &RecordCache {
        &self.cache
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn refresh_cache(&self) -> Result<Vec<DnsRecord>> {
        Ok(self.cache.all())
    }

    async fn create(&self, desired: &DesiredRecord) -> Result<DnsRecord> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            return Err(dnscompanion_core::error::Error::rate_limited(
                "too many requests",
                Some(self.retry_after),
            ));
        }
        let record = DnsRecord {
            external_id: Some("1".to_string()),
            provider_id: "flaky".to_string(),
            record_type: desired.record_type,
            name: desired.name.clone(),
            content: desired.content.clone(),
            ttl: desired.ttl,
            extras: desired.extras.clone(),
            proxied: desired.proxied,
            owned: true,
        };
        self.cache.upsert(record.clone());
        Ok(record)
    }

    async fn update(&self, external_id: &str, desired: &DesiredRecord) -> Result<DnsRecord> {
        let record = DnsRecord {
            external_id: Some(external_id.to_string()),
            provider_id: "flaky".to_string(),
            record_type: desired.record_type,
            name: desired.name.clone(),
            content: desired.content.clone(),
            ttl: desired.ttl,
            extras: desired.extras.clone(),
            proxied: desired.proxied,
            owned: true,
        };
        self.cache.upsert(record.clone());
        Ok(record)
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        self.cache.remove(external_id);
        Ok(())
    }

    fn validate(&self, _desired: &DesiredRecord) -> Result<()> {
        Ok(())
    }

    fn supports_ownership_marker(&self) -> bool {
        false
    }
}

/// A `PublicIpSource` double returning fixed addresses.
pub struct FixedPublicIpSource {
    pub v4: Option<IpAddr>,
    pub v6: Option<IpAddr>,
}

impl PublicIpSource for FixedPublicIpSource {
    fn current_v4(&self) -> Option<IpAddr> {
        self.v4
    }

    fn current_v6(&self) -> Option<IpAddr> {
        self.v6
    }
}
