//! Core traits for the DNS companion system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ProviderClient`]: CRUD + cache + validation against one DNS provider's zone
//! - [`ContainerSource`]: container-runtime discovery of running containers and labels
//! - [`RouterSource`]: reverse-proxy hostname discovery (traefik mode)
//! - [`PublicIpSource`]: resolves the host's current public IPv4/IPv6

pub mod container_source;
pub mod provider;
pub mod public_ip;
pub mod router_source;

pub use container_source::{ContainerEvent, ContainerSource};
pub use provider::{BatchResult, PlannedChange, ProviderClient};
pub use public_ip::PublicIpSource;
pub use router_source::RouterSource;
