//! Bearer credential acquisition.
//!
//! - [`Credential`] - an access token plus its validity window
//! - [`CredentialSource`] - async seam used by the governor before each request
//! - [`TokenProvider`] - password-grant client for the upstream token endpoint
//! - [`StaticCredential`] - a pre-issued token (tests, externally managed tokens)

mod error;
mod token;

pub use error::AuthError;
pub use token::TokenProvider;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Credentials are treated as expired this long before the upstream deadline.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Longest lifetime honoured for any credential.
const MAX_LIFETIME: Duration = Duration::from_secs(86_400);

/// An opaque bearer token with an expiry.
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: Instant,
}

impl Credential {
    /// Creates a credential valid for `lifetime` from now, capped at one day.
    #[must_use]
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Instant::now() + lifetime.min(MAX_LIFETIME),
        }
    }

    /// The raw bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns true while the credential is outside the expiry margin.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Supplies a valid credential for each outbound request.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Returns a valid credential, fetching a fresh one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the upstream rejects the identity or cannot be reached.
    async fn acquire(&self) -> Result<Credential, AuthError>;

    /// Discards the cached credential after a request reported it invalid.
    async fn invalidate(&self);
}

/// A fixed, externally issued token.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        Ok(Credential::new(self.token.clone(), MAX_LIFETIME))
    }

    async fn invalidate(&self) {}
}
