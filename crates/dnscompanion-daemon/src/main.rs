// # dnscompanion-daemon
//
// Thin integration layer ONLY. All reconciliation logic lives in `dnscompanion-core`;
// this binary's job is:
//
// 1. Read configuration from environment variables (§6)
// 2. Validate it
// 3. Wire concrete ContainerSource/RouterSource/PublicIpSource/ProviderClient instances
// 4. Start the `Scheduler` and wait for a shutdown signal with a bounded timeout
//
// DO NOT add business logic, DNS logic, or retry logic here.

use anyhow::{bail, Context, Result};
use dnscompanion_core::{
    CleanupConfig, CompanionConfig, ContainerSource, EventBus, ManagedHostname, OperationMode,
    PreservedHostname, ProviderRegistration, ProviderRouter, ReconcileConfig, RecordExtras,
    RecordType, ResolverDefaults, Scheduler, StateManager, TraefikConfig,
};
use dnscompanion_discovery_docker::DockerContainerSource;
use dnscompanion_discovery_publicip::{HttpPublicIpSource, StaticPublicIp};
use dnscompanion_discovery_traefik::TraefikRouterSource;
use dnscompanion_provider_cloudflare::CloudflareProvider;
use dnscompanion_core::HostnameResolver;
use std::collections::HashMap;
use std::env;
use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit codes, following the convention recorded in §6: 0 clean, 1 config error,
/// 2 unexpected runtime error.
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

struct EnvConfig {
    operation_mode: OperationMode,
    poll_interval: Duration,
    log_level: String,
    cleanup_orphaned: bool,
    cleanup_grace_period: Duration,
    preserved_hostnames: Vec<PreservedHostname>,
    managed_hostnames: Vec<ManagedHostname>,
    resolver_defaults: ResolverDefaults,
    public_ip_v4: Option<IpAddr>,
    public_ip_v6: Option<IpAddr>,
    ip_refresh_interval: Duration,
    api_timeout: Duration,
    docker_socket: Option<String>,
    traefik_api_url: Option<String>,
    traefik_username: Option<String>,
    traefik_password: Option<String>,
    state_data_dir: String,

    cloudflare_api_token: Option<String>,
    cloudflare_zone: Option<String>,
    cloudflare_zone_id: Option<String>,
    cloudflare_account_id: Option<String>,
    dry_run: bool,
}

impl EnvConfig {
    fn from_env() -> Result<Self> {
        let operation_mode = match env::var("OPERATION_MODE").unwrap_or_else(|_| "direct".to_string()).as_str() {
            "traefik" => OperationMode::Traefik,
            "direct" | "" => OperationMode::Direct,
            other => bail!("OPERATION_MODE '{other}' is not supported. Valid: traefik, direct"),
        };

        let poll_interval = Duration::from_millis(
            env::var("POLL_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000),
        );

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let cleanup_orphaned = env::var("CLEANUP_ORPHANED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let cleanup_grace_period = Duration::from_secs(
            60 * env::var("CLEANUP_GRACE_PERIOD")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(15),
        );

        let preserved_hostnames = env::var("PRESERVED_HOSTNAMES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| PreservedHostname(s.to_string()))
            .collect();

        let managed_hostnames = parse_managed_hostnames(&env::var("MANAGED_HOSTNAMES").unwrap_or_default())?;

        let resolver_defaults = ResolverDefaults {
            record_type: env::var("DNS_DEFAULT_TYPE")
                .ok()
                .and_then(|s| parse_record_type(&s))
                .unwrap_or(RecordType::A),
            content: env::var("DNS_DEFAULT_CONTENT").ok(),
            ttl: env::var("DNS_DEFAULT_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            proxied: env::var("DNS_DEFAULT_PROXIED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            dns_label_prefix: env::var("DNS_LABEL_PREFIX").unwrap_or_else(|_| "dns".to_string()),
            traefik_label_prefix: env::var("TRAEFIK_LABEL_PREFIX").unwrap_or_else(|_| "traefik".to_string()),
        };

        let public_ip_v4 = env::var("PUBLIC_IP").ok().and_then(|s| s.parse().ok());
        let public_ip_v6 = env::var("PUBLIC_IPV6").ok().and_then(|s| s.parse().ok());

        let ip_refresh_interval = Duration::from_secs(
            env::var("IP_REFRESH_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        );

        let api_timeout = Duration::from_millis(
            env::var("API_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60_000),
        );

        let docker_socket = env::var("DOCKER_SOCKET").ok();
        let traefik_api_url = env::var("TRAEFIK_API_URL").ok();
        let traefik_username = env::var("TRAEFIK_USERNAME").ok();
        let traefik_password = env::var("TRAEFIK_PASSWORD").ok();
        let state_data_dir = env::var("STATE_DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let cloudflare_api_token = env::var("CLOUDFLARE_API_TOKEN").ok().filter(|s| !s.is_empty());
        let cloudflare_zone = env::var("CLOUDFLARE_ZONE").ok();
        let cloudflare_zone_id = env::var("CLOUDFLARE_ZONE_ID").ok();
        let cloudflare_account_id = env::var("CLOUDFLARE_ACCOUNT_ID").ok();
        let dry_run = env::var("DNS_DRY_RUN").map(|v| v == "true" || v == "1").unwrap_or(false);

        Ok(Self {
            operation_mode,
            poll_interval,
            log_level,
            cleanup_orphaned,
            cleanup_grace_period,
            preserved_hostnames,
            managed_hostnames,
            resolver_defaults,
            public_ip_v4,
            public_ip_v6,
            ip_refresh_interval,
            api_timeout,
            docker_socket,
            traefik_api_url,
            traefik_username,
            traefik_password,
            state_data_dir,
            cloudflare_api_token,
            cloudflare_zone,
            cloudflare_zone_id,
            cloudflare_account_id,
            dry_run,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.operation_mode == OperationMode::Traefik && self.traefik_api_url.is_none() {
            bail!("TRAEFIK_API_URL is required when OPERATION_MODE=traefik");
        }

        if self.cloudflare_api_token.is_none() {
            bail!(
                "no DNS provider is configured. Set CLOUDFLARE_API_TOKEN and CLOUDFLARE_ZONE \
                 to enable the Cloudflare provider."
            );
        }

        if self.cloudflare_zone.as_deref().is_none_or(str::is_empty) {
            bail!("CLOUDFLARE_ZONE is required alongside CLOUDFLARE_API_TOKEN");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "fatal" => {}
            other => bail!("LOG_LEVEL '{other}' is not valid. Valid: trace, debug, info, warn, error, fatal"),
        }

        Ok(())
    }

    fn to_companion_config(&self) -> Result<CompanionConfig> {
        let mut providers = Vec::new();
        if let (Some(_token), Some(zone)) = (&self.cloudflare_api_token, &self.cloudflare_zone) {
            providers.push(ProviderRegistration {
                id: "cloudflare".to_string(),
                display_name: "Cloudflare".to_string(),
                provider_type: "cloudflare".to_string(),
                credentials: HashMap::new(),
                zone: zone.clone(),
                zone_id: self.cloudflare_zone_id.clone(),
                default: true,
            });
        }

        let config = CompanionConfig {
            operation_mode: self.operation_mode,
            poll_interval: self.poll_interval,
            providers,
            managed_hostnames: self.managed_hostnames.clone(),
            preserved_hostnames: self.preserved_hostnames.clone(),
            cleanup: CleanupConfig {
                enabled: self.cleanup_orphaned,
                grace_period: self.cleanup_grace_period,
            },
            resolver_defaults: self.resolver_defaults.clone(),
            traefik: self.traefik_api_url.clone().map(|api_url| TraefikConfig {
                api_url,
                username: self.traefik_username.clone(),
                password: self.traefik_password.clone(),
                poll_interval: Duration::from_secs(30),
            }),
            reconcile: ReconcileConfig {
                per_provider_concurrency: 1,
                max_retries: 3,
                api_timeout: self.api_timeout,
            },
            state_data_dir: self.state_data_dir.clone(),
            log_level: self.log_level.clone(),
        };

        config.validate().context("configuration validation failed")?;
        Ok(config)
    }
}

fn parse_record_type(s: &str) -> Option<RecordType> {
    match s.to_ascii_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::Aaaa),
        "CNAME" => Some(RecordType::Cname),
        "MX" => Some(RecordType::Mx),
        "TXT" => Some(RecordType::Txt),
        "SRV" => Some(RecordType::Srv),
        "CAA" => Some(RecordType::Caa),
        "NS" => Some(RecordType::Ns),
        _ => None,
    }
}

/// Parses `MANAGED_HOSTNAMES` tuples of the form `name:type:content[:ttl[:priority]]`.
fn parse_managed_hostnames(raw: &str) -> Result<Vec<ManagedHostname>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() < 3 {
            bail!("MANAGED_HOSTNAMES entry '{entry}' must have at least name:type:content");
        }
        let record_type = parse_record_type(parts[1])
            .with_context(|| format!("MANAGED_HOSTNAMES entry '{entry}' has an unknown record type"))?;
        let ttl = parts.get(3).and_then(|s| s.parse().ok());
        let mut extras = RecordExtras::default();
        if record_type == RecordType::Mx {
            extras.priority = parts.get(4).and_then(|s| s.parse().ok());
        }
        out.push(ManagedHostname {
            name: parts[0].to_string(),
            record_type,
            content: parts[2].to_string(),
            ttl,
            extras,
        });
    }
    Ok(out)
}

fn main() -> ExitCode {
    let env_config = match EnvConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = env_config.validate() {
        eprintln!("Configuration validation error: {e}");
        return DaemonExitCode::ConfigError.into();
    }

    let env_filter = EnvFilter::try_new(&env_config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {e}");
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(env_config).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                tracing::error!(error = %e, "daemon exited with an error");
                DaemonExitCode::RuntimeError
            }
        }
    });

    result.into()
}

async fn run_daemon(env_config: EnvConfig) -> Result<()> {
    let companion_config = env_config.to_companion_config()?;

    tracing::info!(
        providers = companion_config.providers.len(),
        mode = ?companion_config.operation_mode,
        "starting dnscompanion daemon"
    );

    let mut providers: HashMap<String, Arc<dyn dnscompanion_core::ProviderClient>> = HashMap::new();
    if let (Some(token), Some(zone)) = (&env_config.cloudflare_api_token, &env_config.cloudflare_zone) {
        let provider = CloudflareProvider::new(
            "cloudflare",
            zone.clone(),
            token.clone(),
            env_config.cloudflare_zone_id.clone(),
            env_config.cloudflare_account_id.clone(),
            env_config.dry_run,
        );
        providers.insert("cloudflare".to_string(), Arc::new(provider));
    }

    let router = ProviderRouter::new(companion_config.providers.clone());
    let resolver = HostnameResolver::new(companion_config.resolver_defaults.clone(), None);

    let container_source: Option<Arc<dyn dnscompanion_core::ContainerSource>> =
        match DockerContainerSource::connect(env_config.docker_socket.as_deref()) {
            Ok(source) => {
                source.refresh().await.ok();
                Some(Arc::new(source))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to connect to Docker; running without container discovery");
                None
            }
        };

    let router_source: Option<Arc<dyn dnscompanion_core::RouterSource>> =
        env_config.traefik_api_url.clone().map(|api_url| {
            Arc::new(TraefikRouterSource::new(
                api_url,
                env_config.traefik_username.clone(),
                env_config.traefik_password.clone(),
            )) as Arc<dyn dnscompanion_core::RouterSource>
        });

    let public_ip: Arc<dyn dnscompanion_core::PublicIpSource> =
        if env_config.public_ip_v4.is_some() || env_config.public_ip_v6.is_some() {
            Arc::new(StaticPublicIp::new(env_config.public_ip_v4, env_config.public_ip_v6))
        } else {
            HttpPublicIpSource::spawn(
                Some("https://api.ipify.org".to_string()),
                Some("https://api6.ipify.org".to_string()),
                env_config.ip_refresh_interval,
            )
        };

    let state = Arc::new(StateManager::load(&env_config.state_data_dir).await);

    let events = Arc::new(EventBus::new());
    let scheduler = Scheduler::new(
        companion_config,
        providers,
        router,
        resolver,
        container_source,
        router_source,
        public_ip,
        env_config.managed_hostnames.clone(),
        events,
        state,
    );

    let shutdown = wait_for_shutdown();
    scheduler.run(shutdown, Duration::from_secs(30)).await;

    tracing::info!("daemon shut down cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received CTRL-C");
}
