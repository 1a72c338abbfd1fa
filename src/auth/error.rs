//! Error types for credential acquisition.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while obtaining an access token.
///
/// A rejected identity or an unbuildable client is fatal to a collection run
/// (see [`AuthError::is_fatal`]). Outages of the token endpoint only cost the
/// entity being collected, and a rate-limited token request is cooled down
/// and retried by the governor.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint rejected the client identity.
    #[error("[AUTH] credentials rejected (HTTP {status}): {reason}\n  Suggestion: {suggestion}")]
    Rejected {
        /// HTTP status of the token response (200 when the body carried an error).
        status: u16,
        /// Upstream error string, e.g. `invalid_grant`.
        reason: String,
        /// User-facing hint.
        suggestion: &'static str,
    },

    /// The token endpoint asked the client to slow down (HTTP 429).
    #[error("token endpoint rate limited the request")]
    RateLimited {
        /// Server-provided wait, if any.
        retry_after: Option<Duration>,
    },

    /// The token endpoint answered with an unexpected status (typically 5xx).
    #[error("token endpoint unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// The token endpoint could not be reached.
    #[error("network error requesting token from {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The token response was not the expected JSON.
    #[error("malformed token response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build token client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },
}

impl AuthError {
    /// Creates a rejection error.
    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            reason: reason.into(),
            suggestion: "Check REDDIT_CLIENT_ID, REDDIT_CLIENT_SECRET, REDDIT_USERNAME and REDDIT_PASSWORD.",
        }
    }

    /// Returns true if no further request can succeed with this identity.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Client { .. })
    }

    /// Creates a network error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }
}
