//! Reconciler (§4.7).
//!
//! Classifies a batch of desired records against one provider's cache into
//! create/update/unchanged, applies the changes with a bounded per-provider
//! concurrency cap, and surfaces aggregate stats. A single record's failure
//! never aborts the batch (§7).

use crate::error::{Error, Result};
use crate::events::{EventBus, ReconcileEvent};
use crate::model::{normalize_hostname_content, normalize_name, DesiredRecord, DnsRecord};
use crate::traits::provider::ProviderClient;
use crate::traits::public_ip::PublicIpSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Aggregate counters for one reconcile pass against one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: u64,
}

/// Outcome of classifying and applying a single desired record.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Created(DnsRecord),
    Updated(DnsRecord),
    Unchanged(DnsRecord),
    Failed { desired: DesiredRecord, error: String },
}

/// Backoff schedule for transient transport failures (§5): 250ms, 1s, 4s.
const RETRY_BACKOFFS_MS: [u64; 3] = [250, 1000, 4000];

pub struct Reconciler {
    concurrency_cap: usize,
    max_retries: u32,
    events: Arc<EventBus>,
}

impl Reconciler {
    pub fn new(concurrency_cap: usize, max_retries: u32, events: Arc<EventBus>) -> Self {
        Self {
            concurrency_cap: concurrency_cap.max(1),
            max_retries,
            events,
        }
    }

    /// Two records are equivalent iff, after normalization, type/name/content/ttl and
    /// type-specific extras match, and `proxied` matches where the provider supports it.
    pub fn equivalent(a: &DnsRecord, b: &DnsRecord) -> bool {
        if a.record_type != b.record_type {
            return false;
        }
        if normalize_name(&a.name) != normalize_name(&b.name) {
            return false;
        }
        let content_eq = if a.record_type.content_is_hostname() {
            normalize_hostname_content(&a.content) == normalize_hostname_content(&b.content)
        } else {
            a.content == b.content
        };
        if !content_eq || a.ttl != b.ttl || a.extras != b.extras {
            return false;
        }
        match (a.proxied, b.proxied) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        }
    }

    /// Runs one reconcile pass for `desired` against `provider`.
    ///
    /// 1. Fill pending public-IP lookups (fails closed with `NoPublicIP`, per-record).
    /// 2. Validate each record.
    /// 3. Classify against the cache.
    /// 4. Apply under the per-provider concurrency cap, apex records first.
    /// 5. Emit events and return aggregate stats plus per-record outcomes.
    pub async fn run(
        &self,
        provider: Arc<dyn ProviderClient>,
        desired: Vec<DesiredRecord>,
        public_ip: &dyn PublicIpSource,
    ) -> (Stats, Vec<RecordOutcome>) {
        let mut stats = Stats::default();
        let mut outcomes = Vec::new();
        let mut to_apply = Vec::new();

        for mut record in desired {
            if let Err(e) = Self::fill_pending_lookup(&mut record, public_ip) {
                stats.errors += 1;
                outcomes.push(RecordOutcome::Failed {
                    desired: record,
                    error: e.to_string(),
                });
                continue;
            }

            if let Err(e) = provider.validate(&record) {
                stats.errors += 1;
                outcomes.push(RecordOutcome::Failed {
                    desired: record,
                    error: e.to_string(),
                });
                continue;
            }

            to_apply.push(record);
        }

        // Apex records first (providers may need provider-specific fallback paths for apex).
        to_apply.sort_by_key(|r| !crate::model::is_apex(&r.name, provider.zone()));

        let semaphore = Arc::new(Semaphore::new(self.concurrency_cap));
        let mut handles = Vec::new();

        for desired in to_apply {
            let provider = provider.clone();
            let semaphore = semaphore.clone();
            let max_retries = self.max_retries;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                Self::classify_and_apply(provider.as_ref(), desired, max_retries).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(outcome) => {
                    match &outcome {
                        RecordOutcome::Created(r) => {
                            stats.created += 1;
                            self.events.publish(ReconcileEvent::RecordCreated(r.clone()));
                        }
                        RecordOutcome::Updated(r) => {
                            stats.updated += 1;
                            self.events.publish(ReconcileEvent::RecordUpdated(r.clone()));
                        }
                        RecordOutcome::Unchanged(_) => stats.unchanged += 1,
                        RecordOutcome::Failed { desired, error } => {
                            stats.errors += 1;
                            self.events.publish(ReconcileEvent::Error {
                                hostname: desired.name.clone(),
                                message: error.clone(),
                            });
                        }
                    }
                    outcomes.push(outcome);
                }
                Err(join_err) => {
                    stats.errors += 1;
                    tracing::error!(%join_err, "reconcile task panicked");
                }
            }
        }

        self.events.publish(ReconcileEvent::Completed(stats.clone()));
        (stats, outcomes)
    }

    fn fill_pending_lookup(record: &mut DesiredRecord, public_ip: &dyn PublicIpSource) -> Result<()> {
        if record.needs_public_ipv4 {
            match public_ip.current_v4() {
                Some(ip) => {
                    record.content = ip.to_string();
                    record.needs_public_ipv4 = false;
                }
                None => return Err(Error::NoPublicIP),
            }
        }
        if record.needs_public_ipv6 {
            match public_ip.current_v6() {
                Some(ip) => {
                    record.content = ip.to_string();
                    record.needs_public_ipv6 = false;
                }
                None => return Err(Error::NoPublicIP),
            }
        }
        Ok(())
    }

    async fn classify_and_apply(
        provider: &dyn ProviderClient,
        desired: DesiredRecord,
        max_retries: u32,
    ) -> RecordOutcome {
        let existing = provider.find(desired.record_type, &desired.name).await;

        match existing {
            Ok(Some(current)) => {
                let proposed = DnsRecord {
                    external_id: current.external_id.clone(),
                    provider_id: provider.provider_id().to_string(),
                    record_type: desired.record_type,
                    name: desired.name.clone(),
                    content: desired.content.clone(),
                    ttl: desired.ttl,
                    extras: desired.extras.clone(),
                    proxied: desired.proxied,
                    owned: current.owned,
                };
                if Reconciler::equivalent(&current, &proposed) {
                    return RecordOutcome::Unchanged(current);
                }
                let id = current.external_id.clone().unwrap_or_default();
                Self::apply_with_retry(provider, max_retries, |p| {
                    let desired = desired.clone();
                    let id = id.clone();
                    Box::pin(async move { p.update(&id, &desired).await })
                })
                .await
                .map(RecordOutcome::Updated)
                .unwrap_or_else(|e| RecordOutcome::Failed {
                    desired,
                    error: e.to_string(),
                })
            }
            Ok(None) => match Self::apply_with_retry(provider, max_retries, |p| {
                let desired = desired.clone();
                Box::pin(async move { p.create(&desired).await })
            })
            .await
            {
                Ok(record) => RecordOutcome::Created(record),
                Err(Error::Conflict(msg)) => {
                    // The provider reported the record already exists (S7). Re-read and
                    // treat as unchanged rather than an error.
                    match provider.find(desired.record_type, &desired.name).await {
                        Ok(Some(existing)) => RecordOutcome::Unchanged(existing),
                        _ => RecordOutcome::Failed { desired, error: msg },
                    }
                }
                Err(e) => RecordOutcome::Failed {
                    desired,
                    error: e.to_string(),
                },
            },
            Err(e) => RecordOutcome::Failed {
                desired,
                error: e.to_string(),
            },
        }
    }

    async fn apply_with_retry<'a, F>(
        provider: &'a dyn ProviderClient,
        max_retries: u32,
        op: F,
    ) -> Result<DnsRecord>
    where
        F: Fn(
            &'a dyn ProviderClient,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<DnsRecord>> + Send + 'a>>,
    {
        let mut attempt = 0;
        loop {
            match op(provider).await {
                Ok(record) => return Ok(record),
                Err(Error::Conflict(msg)) => {
                    tracing::debug!(%msg, "provider reported a conflict; treating as unchanged");
                    return Err(Error::Conflict(msg));
                }
                Err(e) if e.is_retryable() && (attempt as usize) < RETRY_BACKOFFS_MS.len().min(max_retries as usize) => {
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| Duration::from_millis(RETRY_BACKOFFS_MS[attempt as usize]));
                    tracing::warn!(attempt, delay_ms = delay.as_millis(), error = %e, "retrying transient provider error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
