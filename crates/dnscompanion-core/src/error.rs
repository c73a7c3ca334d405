//! Error types for the DNS companion system
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DNS companion system
#[derive(Error, Debug)]
pub enum Error {
    /// Provider credentials were rejected or are missing
    #[error("authentication failed for provider {provider}: {message}")]
    AuthError { provider: String, message: String },

    /// The configured zone does not exist (or isn't visible to these credentials)
    #[error("zone not found for provider {provider}: {zone}")]
    ZoneNotFound { provider: String, zone: String },

    /// A record failed type-specific validation
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Transport-level failure talking to an upstream API
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream API is rate limiting us. `retry_after`, when the provider could read it off
    /// the response, is how long to wait before the next attempt.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Upstream reports a conflict (record already exists, CNAME collision, ...)
    #[error("conflict: {0}")]
    Conflict(String),

    /// A record needed the host's public IP but none is known yet
    #[error("no public IP available for pending lookup")]
    NoPublicIP,

    /// Reconcile pass was cancelled by shutdown
    #[error("cancelled by shutdown")]
    CancelledShutdown,

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// State persistence error
    #[error("state store error: {0}")]
    StateStore(String),

    /// Container runtime error
    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Record or hostname not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn zone_not_found(provider: impl Into<String>, zone: impl Into<String>) -> Self {
        Self::ZoneNotFound {
            provider: provider.into(),
            zone: zone.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    pub fn container_runtime(msg: impl Into<String>) -> Self {
        Self::ContainerRuntime(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True for errors that §5's transport retry policy should retry: 5xx/transient network
    /// errors on the fixed backoff schedule, and 429s honoring `retry_after` (§7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited { .. })
    }

    /// The provider-supplied wait before retrying, if this is a `RateLimited` error that
    /// carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
