//! Per-provider in-memory record cache (§4.2).
//!
//! Exclusive to one [`crate::traits::provider::ProviderClient`]; all mutation goes through
//! these methods so readers never observe a torn record.

use crate::model::{normalize_name, DnsRecord, RecordType};
use std::sync::RwLock;

/// In-memory index of the records a provider is known to hold, plus a refresh timestamp.
pub struct RecordCache {
    records: RwLock<Vec<DnsRecord>>,
    last_refreshed: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            last_refreshed: RwLock::new(None),
        }
    }

    /// Atomically replace the entire cache contents; stamps `last_refreshed`.
    pub fn replace_all(&self, records: Vec<DnsRecord>) {
        *self.records.write().expect("cache lock poisoned") = records;
        *self.last_refreshed.write().expect("cache lock poisoned") = Some(chrono::Utc::now());
    }

    /// Insert, or replace if a record with the same `external_id` is already present.
    pub fn upsert(&self, record: DnsRecord) {
        let mut guard = self.records.write().expect("cache lock poisoned");
        if let Some(id) = &record.external_id {
            if let Some(existing) = guard
                .iter_mut()
                .find(|r| r.external_id.as_deref() == Some(id.as_str()))
            {
                *existing = record;
                return;
            }
        }
        guard.push(record);
    }

    pub fn remove(&self, external_id: &str) {
        let mut guard = self.records.write().expect("cache lock poisoned");
        guard.retain(|r| r.external_id.as_deref() != Some(external_id));
    }

    /// Cache lookup with apex and trailing-dot normalization (testable properties 6, 7).
    pub fn find(&self, record_type: RecordType, name: &str, zone: &str) -> Option<DnsRecord> {
        let target = if crate::model::is_apex(name, zone) {
            "@".to_string()
        } else {
            normalize_name(name)
        };
        let guard = self.records.read().expect("cache lock poisoned");
        guard
            .iter()
            .find(|r| {
                r.record_type == record_type
                    && (normalize_name(&r.name) == target
                        || (crate::model::is_apex(&r.name, zone) && target == "@"))
            })
            .cloned()
    }

    pub fn list(&self, type_filter: Option<RecordType>, name_filter: Option<&str>) -> Vec<DnsRecord> {
        let guard = self.records.read().expect("cache lock poisoned");
        guard
            .iter()
            .filter(|r| type_filter.is_none_or(|t| r.record_type == t))
            .filter(|r| {
                name_filter.is_none_or(|n| normalize_name(&r.name) == normalize_name(n))
            })
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<DnsRecord> {
        self.records.read().expect("cache lock poisoned").clone()
    }

    pub fn last_refreshed(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.last_refreshed.read().expect("cache lock poisoned")
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}
