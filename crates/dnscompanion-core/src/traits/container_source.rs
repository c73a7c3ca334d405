// # Container Source Trait
//
// Defines the interface for discovering running containers and their labels.
//
// ## Implementations
//
// - Docker (via the container runtime's Unix socket): `dnscompanion-discovery-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use dnscompanion_core::ContainerSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* ContainerSource implementation */;
//     let running = source.list_running().await?;
//     let mut events = source.watch();
//     while let Some(event) = events.next().await {
//         println!("{:?}", event);
//     }
//     Ok(())
// }
// ```

use crate::error::Result;
use crate::model::Container;
use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use tokio_stream::Stream;

/// A container lifecycle transition observed on the runtime event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    Started(Container),
    Stopped(String),
    Destroyed(String),
}

/// Trait for container-runtime discovery implementations.
///
/// # Trust Level: Semi-Trusted
///
/// Container sources are **semi-trusted** components with the following capabilities:
///
/// ## Allowed Capabilities
/// - ✅ Perform container-runtime I/O (Unix socket, inspect calls)
/// - ✅ Maintain an in-memory map of running containers and their labels
/// - ⚠️ Spawn a task to consume the runtime's event stream (not a polling loop)
///
/// ## Forbidden Capabilities
/// - ❌ Resolve hostnames to desired records (use `HostnameResolver`)
/// - ❌ Talk to any DNS provider
/// - ❌ Implement reconnect backoff policy beyond the capped exponential scheme in §4.3
///
/// ## Rationale
///
/// Container sources need runtime I/O access to observe container lifecycle, but must
/// remain a pure observer of what's running — they are not decision-makers about DNS.
///
/// See `docs/architecture/TRUST_LEVELS.md` for complete trust level definitions.
#[async_trait]
pub trait ContainerSource: Send + Sync {
    /// Cold (re-)list of all currently running containers, seeding or refreshing state.
    async fn refresh(&self) -> Result<Vec<Container>>;

    /// Currently known running containers.
    async fn list_running(&self) -> Result<Vec<Container>>;

    /// Hostnames derived from container labels, mapped to the labels of their owning
    /// container (explicit `dns.hostname` labels, comma-separated, plus routing labels
    /// whose value contains a `Host(\`...\`)` expression). Only strict-FQDN matches are kept.
    async fn labels_by_hostname(&self) -> Result<HashMap<String, HashMap<String, String>>>;

    /// Stream of lifecycle transitions. Must reconnect on transient errors with the
    /// capped exponential backoff described in §4.3 (default 5s -> 60s).
    fn watch(&self) -> Pin<Box<dyn Stream<Item = ContainerEvent> + Send + 'static>>;
}
