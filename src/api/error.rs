//! Error types for upstream API requests.

use thiserror::Error;

/// Unexpected failures of a single API request.
///
/// Rate limits and missing/forbidden resources are not errors; they are
/// reported through [`ApiOutcome`](super::ApiOutcome) variants.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure (DNS, connection refused, TLS, reset).
    #[error("network error requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within the configured timeout.
    #[error("timeout requesting {url}")]
    Timeout { url: String },

    /// Any status not covered by a dedicated outcome.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus { url: String, status: u16 },

    /// The body did not match the expected schema.
    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    /// A subreddit or user name that cannot be requested.
    #[error("invalid collection name '{name}'")]
    InvalidName { name: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build API client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Creates a network error, mapping reqwest timeouts to [`ApiError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }
}
