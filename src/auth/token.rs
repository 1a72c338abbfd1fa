//! Password-grant token provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{AuthError, Credential, CredentialSource};
use crate::api::retry_hint;
use crate::config::{Credentials, HarvestConfig};

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Obtains bearer tokens with the script-app password grant and caches them
/// until expiry or until [`CredentialSource::invalidate`] is called.
#[derive(Debug)]
pub struct TokenProvider {
    client: Client,
    token_url: String,
    user_agent: String,
    credentials: Credentials,
    cached: Mutex<Option<Credential>>,
}

impl TokenProvider {
    /// Creates a provider for the configured identity and token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &HarvestConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| AuthError::Client { source })?;
        Ok(Self {
            client,
            token_url: config.token_url(),
            user_agent: config.user_agent.clone(),
            credentials: config.credentials.clone(),
            cached: Mutex::new(None),
        })
    }

    #[instrument(skip(self), fields(url = %self.token_url))]
    async fn request_token(&self) -> Result<Credential, AuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("username", &self.credentials.username)
            .append_pair("password", &self.credentials.password)
            .finish();

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|source| AuthError::network(&self.token_url, source))?;

        let status = response.status().as_u16();
        match status {
            400 | 401 | 403 => {
                warn!(status, "token endpoint rejected client identity");
                return Err(AuthError::rejected(status, "unauthorized client"));
            }
            429 => {
                let retry_after = retry_hint(response.headers());
                warn!(
                    retry_after_secs = ?retry_after.map(|d| d.as_secs()),
                    "token request rate limited"
                );
                return Err(AuthError::RateLimited { retry_after });
            }
            _ if !response.status().is_success() => {
                warn!(status, "token endpoint unavailable");
                return Err(AuthError::Unavailable { status });
            }
            _ => {}
        }

        let text = response
            .text()
            .await
            .map_err(|source| AuthError::network(&self.token_url, source))?;
        let parsed: TokenResponse = serde_json::from_str(&text)
            .map_err(|err| AuthError::decode(&self.token_url, err.to_string()))?;

        // The endpoint reports bad passwords as 200 with an `error` field.
        if let Some(reason) = parsed.error {
            warn!(%reason, "token endpoint returned an error");
            return Err(AuthError::rejected(status, reason));
        }
        let token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::decode(&self.token_url, "missing access_token"))?;
        let lifetime = parsed
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);

        info!(expires_in_secs = lifetime.as_secs(), "acquired access token");
        Ok(Credential::new(token, lifetime))
    }
}

#[async_trait]
impl CredentialSource for TokenProvider {
    async fn acquire(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref()
            && credential.is_valid()
        {
            return Ok(credential.clone());
        }
        debug!("no valid cached credential; requesting a new token");
        let credential = self.request_token().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    async fn invalidate(&self) {
        debug!("discarding cached credential");
        *self.cached.lock().await = None;
    }
}
