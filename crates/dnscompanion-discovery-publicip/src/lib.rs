// # Public IP Discovery
//
// Resolves this host's current public IPv4/IPv6 by polling an external IP-echo
// service (e.g. ifconfig.me, icanhazip.com, ipify.org).
//
// ## Architecture
//
// A background task polls at the configured interval and stores the last-known
// value in an `ArcSwap`-free `RwLock`. `current_v4`/`current_v6` never block and
// never make a network call themselves — they report whatever was last resolved,
// per the `PublicIpSource` trait's "never block the reconcile pass" contract.
//
// ## Static Override
//
// When `PUBLIC_IP`/`PUBLIC_IPV6` env vars are set (§6), the daemon should
// construct `StaticPublicIp` instead of this poller.

use dnscompanion_core::PublicIpSource;
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A fixed, operator-supplied public IP that never changes. Used when
/// `PUBLIC_IP`/`PUBLIC_IPV6` are set explicitly instead of auto-detected.
pub struct StaticPublicIp {
    v4: Option<IpAddr>,
    v6: Option<IpAddr>,
}

impl StaticPublicIp {
    pub fn new(v4: Option<IpAddr>, v6: Option<IpAddr>) -> Self {
        Self { v4, v6 }
    }
}

impl PublicIpSource for StaticPublicIp {
    fn current_v4(&self) -> Option<IpAddr> {
        self.v4
    }

    fn current_v6(&self) -> Option<IpAddr> {
        self.v6
    }
}

/// Polls an IP-echo HTTP endpoint on a background task and serves the last-known
/// value without blocking.
pub struct HttpPublicIpSource {
    current_v4: RwLock<Option<IpAddr>>,
    current_v6: RwLock<Option<IpAddr>>,
}

impl HttpPublicIpSource {
    /// Spawns the background poller immediately; `current_v4`/`current_v6` return
    /// `None` until the first successful fetch completes.
    pub fn spawn(v4_url: Option<String>, v6_url: Option<String>, refresh_interval: Duration) -> std::sync::Arc<Self> {
        let source = std::sync::Arc::new(Self {
            current_v4: RwLock::new(None),
            current_v6: RwLock::new(None),
        });

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        if let Some(url) = v4_url {
            let source = source.clone();
            let client = client.clone();
            tokio::spawn(async move {
                poll_loop(client, url, refresh_interval, &source.current_v4, "v4").await;
            });
        }

        if let Some(url) = v6_url {
            let source = source.clone();
            tokio::spawn(async move {
                poll_loop(client, url, refresh_interval, &source.current_v6, "v6").await;
            });
        }

        source
    }
}

async fn poll_loop(
    client: reqwest::Client,
    url: String,
    interval: Duration,
    slot: &RwLock<Option<IpAddr>>,
    label: &str,
) {
    let mut last_known: Option<IpAddr> = None;

    loop {
        match fetch_ip(&client, &url).await {
            Ok(ip) => {
                if last_known != Some(ip) {
                    tracing::info!(%label, ?last_known, new = %ip, "public IP changed");
                    last_known = Some(ip);
                    *slot.write().expect("public ip lock poisoned") = Some(ip);
                }
            }
            Err(e) => {
                tracing::warn!(%label, error = %e, "failed to fetch public IP; keeping last-known value");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

async fn fetch_ip(client: &reqwest::Client, url: &str) -> Result<IpAddr, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("unexpected status: {}", response.status()));
    }

    let text = response
        .text()
        .await
        .map_err(|e| format!("failed to read response: {e}"))?;

    text.trim()
        .parse::<IpAddr>()
        .map_err(|_| format!("invalid IP address in response: {}", text.trim()))
}

impl PublicIpSource for HttpPublicIpSource {
    fn current_v4(&self) -> Option<IpAddr> {
        *self.current_v4.read().expect("public ip lock poisoned")
    }

    fn current_v6(&self) -> Option<IpAddr> {
        *self.current_v6.read().expect("public ip lock poisoned")
    }
}
