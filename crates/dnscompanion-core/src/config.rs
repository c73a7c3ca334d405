//! Configuration types for the DNS companion system
//!
//! This module defines the structured configuration consumed by the reconciliation
//! engine. The daemon binary builds one of these from environment variables (§6);
//! it is equally constructible from a config file or tests.

use crate::model::{ManagedHostname, PreservedHostname, ProviderRegistration};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discovery mode: `traefik` reads routing rules, `direct` reads container labels only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    Traefik,
    Direct,
}

impl Default for OperationMode {
    fn default() -> Self {
        Self::Direct
    }
}

/// Top-level reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    pub operation_mode: OperationMode,

    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    pub providers: Vec<ProviderRegistration>,

    #[serde(default)]
    pub managed_hostnames: Vec<ManagedHostname>,

    #[serde(default)]
    pub preserved_hostnames: Vec<PreservedHostname>,

    pub cleanup: CleanupConfig,

    pub resolver_defaults: ResolverDefaults,

    #[serde(default)]
    pub traefik: Option<TraefikConfig>,

    pub reconcile: ReconcileConfig,

    #[serde(default = "default_state_dir")]
    pub state_data_dir: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_state_dir() -> String {
    "./data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CompanionConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.providers.is_empty() {
            tracing::warn!("no DNS providers configured; reconcile passes will be a no-op (S1)");
        }

        let default_count = self.providers.iter().filter(|p| p.default).count();
        if default_count > 1 {
            return Err(crate::Error::config(
                "at most one provider may be marked as default",
            ));
        }

        for provider in &self.providers {
            if provider.zone.trim().is_empty() {
                return Err(crate::Error::config(format!(
                    "provider {} has an empty zone",
                    provider.id
                )));
            }
        }

        if self.operation_mode == OperationMode::Traefik && self.traefik.is_none() {
            return Err(crate::Error::config(
                "operation_mode=traefik requires a traefik configuration block",
            ));
        }

        self.reconcile.validate()?;
        self.cleanup.validate()?;

        Ok(())
    }
}

/// Orphan-cleanup behavior (§4.8, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub enabled: bool,
    #[serde(with = "duration_minutes")]
    pub grace_period: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period: Duration::from_secs(15 * 60),
        }
    }
}

impl CleanupConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.grace_period.as_secs() == 0 && self.enabled {
            return Err(crate::Error::config(
                "cleanup grace period must be greater than zero when cleanup is enabled",
            ));
        }
        Ok(())
    }
}

/// Defaults applied by `HostnameResolver` when a hostname carries no explicit overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverDefaults {
    pub record_type: crate::model::RecordType,
    #[serde(default)]
    pub content: Option<String>,
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default = "default_dns_label_prefix")]
    pub dns_label_prefix: String,
    #[serde(default = "default_traefik_label_prefix")]
    pub traefik_label_prefix: String,
}

fn default_dns_label_prefix() -> String {
    "dns".to_string()
}

fn default_traefik_label_prefix() -> String {
    "traefik".to_string()
}

impl Default for ResolverDefaults {
    fn default() -> Self {
        Self {
            record_type: crate::model::RecordType::A,
            content: None,
            ttl: 300,
            proxied: false,
            dns_label_prefix: default_dns_label_prefix(),
            traefik_label_prefix: default_traefik_label_prefix(),
        }
    }
}

/// Traefik RouterSource connection details (§4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraefikConfig {
    pub api_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

/// Concurrency and retry knobs for the Reconciler (§4.7, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_concurrency_cap")]
    pub per_provider_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(with = "duration_millis", default = "default_api_timeout")]
    pub api_timeout: Duration,
}

fn default_concurrency_cap() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            per_provider_concurrency: default_concurrency_cap(),
            max_retries: default_max_retries(),
            api_timeout: default_api_timeout(),
        }
    }
}

impl ReconcileConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.per_provider_concurrency == 0 {
            return Err(crate::Error::config(
                "per_provider_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod duration_minutes {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs() / 60)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)? * 60))
    }
}
