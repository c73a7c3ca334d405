// # Docker Container Source
//
// Implements `ContainerSource` (§4.3) against the Docker Engine API via `bollard`.
//
// On `refresh()`/startup: lists all containers to seed the map. `watch()` subscribes
// to the Docker event stream for `start`/`stop`/`die`/`pause`/`unpause`/`destroy` and
// reconnects with capped exponential backoff (5s -> 60s) on transient stream errors.
//
// ## Trust Level: Semi-Trusted (see `dnscompanion_core::traits::container_source`)

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::system::EventsOptions;
use bollard::Docker;
use dnscompanion_core::error::{Error, Result};
use dnscompanion_core::{Container, ContainerEvent, ContainerSource, ContainerState};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

const MIN_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

pub struct DockerContainerSource {
    docker: Docker,
    containers: RwLock<HashMap<String, Container>>,
}

impl DockerContainerSource {
    pub fn connect(socket_path: Option<&str>) -> Result<Self> {
        let docker = match socket_path {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| Error::container_runtime(format!("failed to connect to Docker socket {path}: {e}")))?,
            None => Docker::connect_with_local_defaults()
                .map_err(|e| Error::container_runtime(format!("failed to connect to Docker: {e}")))?,
        };

        Ok(Self {
            docker,
            containers: RwLock::new(HashMap::new()),
        })
    }

    async fn inspect_to_container(&self, id: &str) -> Result<Container> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| Error::container_runtime(format!("inspect {id} failed: {e}")))?;

        let name = inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| id.to_string());

        let labels = inspect
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default();

        let running = inspect
            .state
            .and_then(|s| s.running)
            .unwrap_or(false);

        Ok(Container {
            id: id.to_string(),
            name,
            state: if running { ContainerState::Running } else { ContainerState::Stopped },
            labels,
        })
    }
}

#[async_trait]
impl ContainerSource for DockerContainerSource {
    async fn refresh(&self) -> Result<Vec<Container>> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::container_runtime(format!("list_containers failed: {e}")))?;

        let mut seen = Vec::new();
        let mut map = self.containers.write().expect("container map lock poisoned");
        map.clear();

        for summary in summaries {
            let Some(id) = summary.id else { continue };
            let name = summary
                .names
                .and_then(|names| names.into_iter().next())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| id.clone());
            let labels = summary.labels.unwrap_or_default();
            let container = Container {
                id: id.clone(),
                name,
                state: ContainerState::Running,
                labels,
            };
            map.insert(id, container.clone());
            seen.push(container);
        }

        Ok(seen)
    }

    async fn list_running(&self) -> Result<Vec<Container>> {
        Ok(self
            .containers
            .read()
            .expect("container map lock poisoned")
            .values()
            .filter(|c| c.state == ContainerState::Running)
            .cloned()
            .collect())
    }

    async fn labels_by_hostname(&self) -> Result<HashMap<String, HashMap<String, String>>> {
        let mut out = HashMap::new();
        let containers = self.containers.read().expect("container map lock poisoned").clone();

        for container in containers.values() {
            if container.state != ContainerState::Running {
                continue;
            }
            for hostname in extract_hostnames_from_labels(&container.labels) {
                out.entry(hostname).or_insert_with(|| container.labels.clone());
            }
        }

        Ok(out)
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ContainerEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let mut backoff = MIN_RECONNECT_BACKOFF;

            loop {
                let mut filters = HashMap::new();
                filters.insert(
                    "event".to_string(),
                    vec![
                        "start".to_string(),
                        "stop".to_string(),
                        "die".to_string(),
                        "pause".to_string(),
                        "unpause".to_string(),
                        "destroy".to_string(),
                    ],
                );

                let mut stream = docker.events(Some(EventsOptions::<String> {
                    since: None,
                    until: None,
                    filters,
                }));

                let mut connected_cleanly = true;
                while let Some(event) = stream.next().await {
                    match event {
                        Ok(message) => {
                            backoff = MIN_RECONNECT_BACKOFF;
                            if let Some(event) = to_container_event(&message) {
                                if tx.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "docker event stream error; reconnecting");
                            connected_cleanly = false;
                            break;
                        }
                    }
                }

                if !connected_cleanly {
                    tracing::warn!(?backoff, "reconnecting to docker event stream after backoff");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
                } else {
                    // Stream ended cleanly (daemon closed connection); still reconnect.
                    tokio::time::sleep(MIN_RECONNECT_BACKOFF).await;
                }
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

fn to_container_event(message: &bollard::system::EventMessage) -> Option<ContainerEvent> {
    let action = message.action.as_deref()?;
    let id = message.actor.as_ref()?.id.clone()?;

    match action {
        "start" => {
            let labels = message
                .actor
                .as_ref()
                .and_then(|a| a.attributes.clone())
                .unwrap_or_default();
            Some(ContainerEvent::Started(Container {
                id: id.clone(),
                name: id,
                state: ContainerState::Running,
                labels,
            }))
        }
        "stop" | "die" | "pause" => Some(ContainerEvent::Stopped(id)),
        "destroy" => Some(ContainerEvent::Destroyed(id)),
        _ => None,
    }
}

/// Extracts hostnames from an explicit comma-separated `dns.hostname` label, plus any
/// routing labels whose value contains `Host(`...`)` terms. Only strict-FQDN matches
/// are kept (mirrors the RouterSource's own FQDN validation, §4.3/§4.4).
fn extract_hostnames_from_labels(labels: &HashMap<String, String>) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(explicit) = labels.get("dns.hostname") {
        for candidate in explicit.split(',') {
            let candidate = candidate.trim().to_ascii_lowercase();
            if is_strict_fqdn(&candidate) {
                out.push(candidate);
            }
        }
    }

    for value in labels.values() {
        if !value.contains("Host(") {
            continue;
        }
        for part in value.split(['`']).skip(1).step_by(2) {
            let candidate = part.trim().to_ascii_lowercase();
            if is_strict_fqdn(&candidate) {
                out.push(candidate);
            }
        }
    }

    out
}

fn is_strict_fqdn(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.len() > 253 || !candidate.contains('.') {
        return false;
    }
    candidate.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_explicit_dns_hostname_label() {
        let mut labels = HashMap::new();
        labels.insert("dns.hostname".to_string(), "a.example.com, b.example.com".to_string());
        let hosts = extract_hostnames_from_labels(&labels);
        assert_eq!(hosts, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn extracts_hostname_from_traefik_routing_label() {
        let mut labels = HashMap::new();
        labels.insert(
            "traefik.http.routers.app.rule".to_string(),
            "Host(`app.example.com`)".to_string(),
        );
        let hosts = extract_hostnames_from_labels(&labels);
        assert_eq!(hosts, vec!["app.example.com"]);
    }

    #[test]
    fn rejects_non_fqdn_candidates() {
        let mut labels = HashMap::new();
        labels.insert("dns.hostname".to_string(), "not-a-hostname".to_string());
        assert!(extract_hostnames_from_labels(&labels).is_empty());
    }
}
