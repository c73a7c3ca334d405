//! Orphan reaper (§4.8).
//!
//! Finds provider records this system previously created whose hostnames are no longer
//! desired, tracks how long each has been orphaned, and deletes them once the grace
//! period has elapsed — unless a preservation pattern protects them.

use crate::events::{EventBus, ReconcileEvent};
use crate::model::{normalize_name, DnsRecord, PreservedHostname};
use crate::traits::provider::ProviderClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// `(provider_id, external_id)` side-table key for `firstSeenOrphanAt`.
type OrphanKey = (String, String);

pub struct OrphanReaper {
    first_seen: RwLock<HashMap<OrphanKey, DateTime<Utc>>>,
    grace_period: Duration,
    cleanup_enabled: bool,
    preserved: Vec<PreservedHostname>,
    events: Arc<EventBus>,
}

#[derive(Debug, Clone, Default)]
pub struct ReapStats {
    pub tracked: u64,
    pub deleted: u64,
    pub preserved: u64,
}

impl OrphanReaper {
    pub fn new(
        grace_period: Duration,
        cleanup_enabled: bool,
        preserved: Vec<PreservedHostname>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            first_seen: RwLock::new(HashMap::new()),
            grace_period,
            cleanup_enabled,
            preserved,
            events,
        }
    }

    /// One orphan-detection tick against `provider`'s cache.
    ///
    /// `desired_names` is the set of hostnames the `HostnameResolver` currently wants.
    /// Records created out-of-band (not present in the desired set, and for providers
    /// that support it, lacking the ownership marker) are skipped rather than tracked
    /// as orphans at all.
    pub async fn reap(
        &self,
        provider: &dyn ProviderClient,
        desired_names: &std::collections::HashSet<String>,
    ) -> ReapStats {
        let mut stats = ReapStats::default();
        let now = Utc::now();
        let cache_records = provider.cache().all();

        for record in &cache_records {
            let key = orphan_key(provider.provider_id(), record);
            let name = normalize_name(&record.name);

            if desired_names.contains(&name) {
                self.clear(&key);
                continue;
            }

            if self.matches_preserved(&name) {
                self.clear(&key);
                stats.preserved += 1;
                continue;
            }

            if provider.supports_ownership_marker() && !Self::has_ownership_marker(record) {
                continue;
            }

            let first_seen = {
                let mut guard = self.first_seen.write().expect("orphan table lock poisoned");
                *guard.entry(key.clone()).or_insert(now)
            };
            stats.tracked += 1;

            let age = now.signed_duration_since(first_seen);
            let grace = chrono::Duration::from_std(self.grace_period).unwrap_or_default();

            if self.cleanup_enabled && age >= grace {
                if let Some(id) = &record.external_id {
                    match provider.delete(id).await {
                        Ok(()) => {
                            self.clear(&key);
                            stats.deleted += 1;
                            self.events.publish(ReconcileEvent::RecordDeleted {
                                provider_id: provider.provider_id().to_string(),
                                external_id: id.clone(),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, hostname = %name, "failed to delete orphaned record");
                        }
                    }
                }
            }
        }

        stats
    }

    fn clear(&self, key: &OrphanKey) {
        self.first_seen.write().expect("orphan table lock poisoned").remove(key);
    }

    fn matches_preserved(&self, name: &str) -> bool {
        self.preserved.iter().any(|p| p.matches(name))
    }

    fn has_ownership_marker(record: &DnsRecord) -> bool {
        record.owned
    }
}

fn orphan_key(provider_id: &str, record: &DnsRecord) -> OrphanKey {
    (
        provider_id.to_string(),
        record.external_id.clone().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RecordCache;
    use crate::error::Result;
    use crate::model::{DesiredRecord, RecordExtras, RecordType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct MockProvider {
        cache: RecordCache,
        zone: String,
        deleted: AtomicU64,
        marks_ownership: bool,
    }

    #[async_trait]
    impl ProviderClient for MockProvider {
        fn provider_id(&self) -> &str {
            "mock"
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
            unimplemented!()
        }
        async fn update(&self, _id: &str, _desired: &DesiredRecord) -> Result<DnsRecord> {
            unimplemented!()
        }
        async fn delete(&self, id: &str) -> Result<()> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            self.cache.remove(id);
            Ok(())
        }
        fn validate(&self, _desired: &DesiredRecord) -> Result<()> {
            Ok(())
        }
        fn supports_ownership_marker(&self) -> bool {
            self.marks_ownership
        }
    }

    fn rec(id: &str, name: &str) -> DnsRecord {
        DnsRecord {
            external_id: Some(id.to_string()),
            provider_id: "mock".to_string(),
            record_type: RecordType::A,
            name: name.to_string(),
            content: "1.2.3.4".to_string(),
            ttl: 300,
            extras: RecordExtras::default(),
            proxied: None,
            owned: true,
        }
    }

    #[tokio::test]
    async fn no_delete_before_grace_period_elapses() {
        let provider = MockProvider {
            cache: RecordCache::new(),
            zone: "example.com".to_string(),
            deleted: AtomicU64::new(0),
            marks_ownership: false,
        };
        provider.cache.upsert(rec("1", "gone.example.com"));

        let reaper = OrphanReaper::new(
            Duration::from_secs(900),
            true,
            vec![],
            Arc::new(EventBus::new()),
        );
        let desired = std::collections::HashSet::new();
        let stats = reaper.reap(&provider, &desired).await;

        assert_eq!(stats.deleted, 0);
        assert_eq!(provider.deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn desired_hostname_is_never_tracked_as_orphan() {
        let provider = MockProvider {
            cache: RecordCache::new(),
            zone: "example.com".to_string(),
            deleted: AtomicU64::new(0),
            marks_ownership: false,
        };
        provider.cache.upsert(rec("1", "kept.example.com"));

        let reaper = OrphanReaper::new(Duration::from_secs(0), true, vec![], Arc::new(EventBus::new()));
        let mut desired = std::collections::HashSet::new();
        desired.insert("kept.example.com".to_string());
        let stats = reaper.reap(&provider, &desired).await;

        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.tracked, 0);
    }

    #[tokio::test]
    async fn preserved_pattern_is_never_deleted() {
        let provider = MockProvider {
            cache: RecordCache::new(),
            zone: "example.com".to_string(),
            deleted: AtomicU64::new(0),
            marks_ownership: false,
        };
        provider.cache.upsert(rec("1", "admin.example.com"));

        let reaper = OrphanReaper::new(
            Duration::from_secs(0),
            true,
            vec![PreservedHostname("admin.example.com".to_string())],
            Arc::new(EventBus::new()),
        );
        let desired = std::collections::HashSet::new();
        let stats = reaper.reap(&provider, &desired).await;

        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.preserved, 1);
    }

    #[tokio::test]
    async fn deletes_after_grace_period_when_enabled() {
        let provider = MockProvider {
            cache: RecordCache::new(),
            zone: "example.com".to_string(),
            deleted: AtomicU64::new(0),
            marks_ownership: false,
        };
        provider.cache.upsert(rec("1", "gone.example.com"));

        let reaper = OrphanReaper::new(Duration::from_secs(0), true, vec![], Arc::new(EventBus::new()));
        let desired = std::collections::HashSet::new();

        // First tick marks it orphaned (age 0 >= grace 0, so it deletes immediately
        // since grace_period is zero here — exercised distinctly from the "no delete
        // before grace" case above, which uses a non-zero grace period).
        let stats = reaper.reap(&provider, &desired).await;
        assert_eq!(stats.deleted, 1);
        assert_eq!(provider.deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmarked_records_are_ignored_when_provider_supports_markers() {
        let provider = MockProvider {
            cache: RecordCache::new(),
            zone: "example.com".to_string(),
            deleted: AtomicU64::new(0),
            marks_ownership: true,
        };
        let mut hand_managed = rec("1", "gone.example.com");
        hand_managed.owned = false;
        provider.cache.upsert(hand_managed);

        let reaper = OrphanReaper::new(Duration::from_secs(0), true, vec![], Arc::new(EventBus::new()));
        let desired = std::collections::HashSet::new();
        let stats = reaper.reap(&provider, &desired).await;

        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.tracked, 0);
        assert_eq!(provider.deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn marked_records_are_deleted_when_provider_supports_markers() {
        let provider = MockProvider {
            cache: RecordCache::new(),
            zone: "example.com".to_string(),
            deleted: AtomicU64::new(0),
            marks_ownership: true,
        };
        provider.cache.upsert(rec("1", "gone.example.com"));

        let reaper = OrphanReaper::new(Duration::from_secs(0), true, vec![], Arc::new(EventBus::new()));
        let desired = std::collections::HashSet::new();
        let stats = reaper.reap(&provider, &desired).await;

        assert_eq!(stats.deleted, 1);
        assert_eq!(provider.deleted.load(Ordering::SeqCst), 1);
    }
}
