//! Error taxonomy for collection runs.

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::AuthError;
use crate::emit::SinkError;

/// Errors surfaced by the governor and the collectors built on it.
///
/// Only a rejected identity ([`CollectError::Auth`] with a fatal
/// [`AuthError`]) and [`CollectError::Sink`] end a run. Every other variant is
/// scoped to the entity being collected.
#[derive(Debug, Error)]
pub enum CollectError {
    /// No credential could be obtained. Fatal when the identity was rejected.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The same request kept hitting the rate limit.
    #[error("rate limit persisted for {operation} on {entity} after {attempts} retries")]
    RateLimitExceeded {
        operation: &'static str,
        entity: String,
        attempts: u32,
    },

    /// Unexpected failure while collecting one entity.
    #[error("{operation} failed for {entity}: {source}")]
    Entity {
        entity: String,
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    /// Batches can no longer be persisted. Fatal.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The operator interrupted the run.
    #[error("collection interrupted")]
    Interrupted,
}

impl CollectError {
    /// Creates an entity-scoped error.
    pub fn entity(entity: impl Into<String>, operation: &'static str, source: ApiError) -> Self {
        Self::Entity {
            entity: entity.into(),
            operation,
            source,
        }
    }

    /// Returns true if the whole run must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Auth(err) => err.is_fatal(),
            Self::Sink(_) => true,
            Self::RateLimitExceeded { .. } | Self::Entity { .. } | Self::Interrupted => false,
        }
    }
}
