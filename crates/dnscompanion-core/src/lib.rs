//! Core reconciliation engine for container-driven DNS synchronization.
//!
//! ## Design Principles
//!
//! - **Separation of concerns**: discovery (`ContainerSource`/`RouterSource`), hostname
//!   resolution, provider routing, reconciliation, and orphan cleanup are independent
//!   components wired together only by the `Scheduler`.
//! - **Event-driven**: state changes fan out on a typed `EventBus`; no component polls
//!   another component's internals.
//! - **Provider-agnostic**: `ProviderClient` is the only seam an upstream DNS API touches;
//!   the reconciler and orphan reaper never know which concrete provider they're driving.
//! - **Idempotency**: two reconcile passes with no external changes must be a no-op
//!   (testable property 1).

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod orphan;
pub mod reconciler;
pub mod resolver;
pub mod router;
pub mod scheduler;
pub mod state;
pub mod traits;

pub use cache::RecordCache;
pub use config::CompanionConfig;
pub use error::{Error, Result};
pub use events::{EventBus, ReconcileEvent};
pub use model::{
    Container, ContainerState, DesiredRecord, DesiredSource, DnsRecord, ManagedHostname,
    PreservedHostname, ProviderRegistration, RecordExtras, RecordType,
};
pub use orphan::{OrphanReaper, ReapStats};
pub use reconciler::{Reconciler, RecordOutcome, Stats};
pub use resolver::HostnameResolver;
pub use router::ProviderRouter;
pub use scheduler::Scheduler;
pub use state::{DebouncedWriter, StateDocument, StateManager};
pub use traits::{
    BatchResult, ContainerEvent, ContainerSource, PlannedChange, ProviderClient, PublicIpSource,
    RouterSource,
};
