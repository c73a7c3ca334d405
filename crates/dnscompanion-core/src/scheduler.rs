//! Scheduler / orchestrator (§4.10).
//!
//! Wires sources, providers, and the reconcile/orphan pipeline together, runs the
//! periodic reconcile tick (debounced against source-change notifications), and
//! handles graceful shutdown with a bounded timeout.

use crate::config::CompanionConfig;
use crate::events::{EventBus, ReconcileEvent};
use crate::model::ManagedHostname;
use crate::orphan::OrphanReaper;
use crate::reconciler::{RecordOutcome, Reconciler};
use crate::resolver::HostnameResolver;
use crate::router::ProviderRouter;
use crate::state::{DebouncedWriter, StateManager, TrackedRecordSummary};
use crate::traits::container_source::ContainerSource;
use crate::traits::provider::ProviderClient;
use crate::traits::public_ip::PublicIpSource;
use crate::traits::router_source::RouterSource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Minimum elapsed time between two reconcile passes, coalescing bursts of
/// source-change notifications into a single pass (§4.10, §9).
const MIN_DEBOUNCE: Duration = Duration::from_secs(2);

/// Default debounce window for flushing `state.json` (§4.12).
const STATE_FLUSH_DEBOUNCE: Duration = Duration::from_secs(2);

pub struct Scheduler {
    config: CompanionConfig,
    providers: HashMap<String, Arc<dyn ProviderClient>>,
    router: ProviderRouter,
    resolver: HostnameResolver,
    container_source: Option<Arc<dyn ContainerSource>>,
    router_source: Option<Arc<dyn RouterSource>>,
    public_ip: Arc<dyn PublicIpSource>,
    managed_hostnames: Vec<ManagedHostname>,
    events: Arc<EventBus>,
    change_notify: Arc<Notify>,
    state: Arc<StateManager>,
    state_writer: DebouncedWriter,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CompanionConfig,
        providers: HashMap<String, Arc<dyn ProviderClient>>,
        router: ProviderRouter,
        resolver: HostnameResolver,
        container_source: Option<Arc<dyn ContainerSource>>,
        router_source: Option<Arc<dyn RouterSource>>,
        public_ip: Arc<dyn PublicIpSource>,
        managed_hostnames: Vec<ManagedHostname>,
        events: Arc<EventBus>,
        state: Arc<StateManager>,
    ) -> Self {
        let state_writer = DebouncedWriter::spawn(state.clone(), STATE_FLUSH_DEBOUNCE);
        Self {
            config,
            providers,
            router,
            resolver,
            container_source,
            router_source,
            public_ip,
            managed_hostnames,
            events,
            change_notify: Arc::new(Notify::new()),
            state,
            state_writer,
        }
    }

    /// Runs until `shutdown` resolves, then waits up to `shutdown_timeout` for the
    /// in-flight reconcile pass before returning.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>, shutdown_timeout: Duration) {
        self.events.publish(ReconcileEvent::SystemStarted);

        // Init every provider independently; one provider's auth/zone failure does not
        // prevent the others from running (§7).
        for (id, provider) in &self.providers {
            if let Err(e) = provider.init().await {
                tracing::error!(provider_id = %id, error = %e, "provider failed to initialize; it will be skipped this run");
            }
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        let mut last_pass = tokio::time::Instant::now() - MIN_DEBOUNCE;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received; waiting for in-flight reconcile pass");
                    break;
                }
                _ = interval.tick() => {
                    self.maybe_run_pass(&mut last_pass).await;
                }
                _ = self.change_notify.notified() => {
                    self.maybe_run_pass(&mut last_pass).await;
                }
            }
        }

        let _ = tokio::time::timeout(shutdown_timeout, self.reconcile_once()).await;
        self.events.publish(ReconcileEvent::SystemShutdown);
    }

    async fn maybe_run_pass(&self, last_pass: &mut tokio::time::Instant) {
        if last_pass.elapsed() < MIN_DEBOUNCE {
            return;
        }
        *last_pass = tokio::time::Instant::now();
        self.reconcile_once().await;
    }

    /// Notify the scheduler that a source changed, triggering a debounced reconcile pass.
    pub fn notify_change(&self) {
        self.change_notify.notify_one();
    }

    async fn reconcile_once(&self) {
        let router_hostnames = match &self.router_source {
            Some(source) => source.poll().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "router source poll failed; using empty snapshot for this pass");
                HashSet::new()
            }),
            None => HashSet::new(),
        };

        let label_hostnames = match &self.container_source {
            Some(source) => source.labels_by_hostname().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "container source query failed; using empty map for this pass");
                HashMap::new()
            }),
            None => HashMap::new(),
        };

        self.events
            .publish(ReconcileEvent::RouterSnapshot(router_hostnames.clone()));

        let desired = self.resolver.resolve(
            &router_hostnames,
            &label_hostnames,
            &self.managed_hostnames,
            self.public_ip.as_ref(),
        );

        self.events
            .publish(ReconcileEvent::DesiredRecordsUpdated(desired.len()));

        let mut by_provider: HashMap<String, Vec<crate::model::DesiredRecord>> = HashMap::new();
        let mut desired_names_by_provider: HashMap<String, HashSet<String>> = HashMap::new();

        for mut record in desired {
            let Some(registration) = self.router.route(&record.name) else {
                // No providers configured at all (S1): reconcile pass is a no-op.
                continue;
            };
            record.provider_id = registration.id.clone();
            desired_names_by_provider
                .entry(registration.id.clone())
                .or_default()
                .insert(crate::model::normalize_name(&record.name));
            by_provider.entry(registration.id.clone()).or_default().push(record);
        }

        let reconciler = Reconciler::new(
            self.config.reconcile.per_provider_concurrency,
            self.config.reconcile.max_retries,
            self.events.clone(),
        );
        let orphan_reaper = OrphanReaper::new(
            self.config.cleanup.grace_period,
            self.config.cleanup.enabled,
            self.config.preserved_hostnames.clone(),
            self.events.clone(),
        );

        let reconciler = Arc::new(reconciler);
        let orphan_reaper = Arc::new(orphan_reaper);
        let mut handles = Vec::new();
        for (provider_id, provider) in &self.providers {
            let desired = by_provider.remove(provider_id).unwrap_or_default();
            let desired_names = desired_names_by_provider
                .remove(provider_id)
                .unwrap_or_default();
            let provider = provider.clone();
            let reconciler = reconciler.clone();
            let orphan_reaper = orphan_reaper.clone();
            let public_ip = self.public_ip.clone();
            let provider_id = provider_id.clone();
            handles.push(tokio::spawn(async move {
                let (stats, outcomes) = reconciler.run(provider.clone(), desired, public_ip.as_ref()).await;
                let reap_stats = orphan_reaper.reap(provider.as_ref(), &desired_names).await;
                (provider_id, stats, outcomes, reap_stats)
            }));
        }

        let mut total_created = 0u64;
        let mut total_updated = 0u64;
        let mut total_deleted = 0u64;
        let mut total_errors = 0u64;
        let mut new_tracked = Vec::new();

        for handle in handles {
            match handle.await {
                Ok((provider_id, stats, outcomes, reap_stats)) => {
                    total_created += stats.created;
                    total_updated += stats.updated;
                    total_errors += stats.errors;
                    total_deleted += reap_stats.deleted;

                    for outcome in outcomes {
                        let record = match outcome {
                            RecordOutcome::Created(r) | RecordOutcome::Updated(r) => r,
                            _ => continue,
                        };
                        if let Some(external_id) = record.external_id.clone() {
                            let key = format!("{provider_id}:{external_id}");
                            new_tracked.push((
                                key,
                                TrackedRecordSummary {
                                    hostname: record.name.clone(),
                                    record_type: record.record_type,
                                    provider_id: provider_id.clone(),
                                    external_id,
                                    created_at: chrono::Utc::now(),
                                },
                            ));
                        }
                    }
                }
                Err(e) => {
                    total_errors += 1;
                    tracing::error!(error = %e, "per-provider reconcile task panicked");
                }
            }
        }

        // Tracked records are rebuilt against each provider's cache after the pass, so a
        // record deleted by the orphan reaper drops out without needing its id threaded
        // back through `ReapStats`.
        let mut valid_ids: HashSet<(String, String)> = HashSet::new();
        for (provider_id, provider) in &self.providers {
            for record in provider.cache().all() {
                if let Some(external_id) = record.external_id {
                    valid_ids.insert((provider_id.clone(), external_id));
                }
            }
        }

        let public_v4 = self.public_ip.current_v4().map(|ip| ip.to_string());
        let public_v6 = self.public_ip.current_v6().map(|ip| ip.to_string());

        self.state
            .with_mut(|doc| {
                doc.stats.created += total_created;
                doc.stats.updated += total_updated;
                doc.stats.deleted += total_deleted;
                doc.stats.errors += total_errors;
                doc.stats.last_poll = Some(chrono::Utc::now());
                if let Some(v4) = public_v4 {
                    doc.last_known_public_ipv4 = Some(v4);
                }
                if let Some(v6) = public_v6 {
                    doc.last_known_public_ipv6 = Some(v6);
                }
                doc.tracked_records.retain(|_, summary| {
                    valid_ids.contains(&(summary.provider_id.clone(), summary.external_id.clone()))
                });
                for (key, summary) in new_tracked {
                    doc.tracked_records.insert(key, summary);
                }
            })
            .await;
        self.state_writer.mark();
    }
}
