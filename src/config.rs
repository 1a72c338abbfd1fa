//! Explicit configuration for a collection run.
//!
//! Every component receives the pieces of [`HarvestConfig`] it needs at
//! construction. Only [`HarvestConfig::from_env`] touches the process
//! environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Upstream maximum items per listing page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default delay between listing pages (2 seconds).
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(2);

/// Default delay between entities (5 seconds).
pub const DEFAULT_ENTITY_DELAY: Duration = Duration::from_secs(5);

/// Default cool-down after a rate-limit response (60 seconds).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default cap on rate-limit retries for one request.
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Default minimum spacing between any two requests (60 requests per minute).
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(1000);

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Token endpoint host.
pub const DEFAULT_AUTH_BASE: &str = "https://www.reddit.com";

/// OAuth API host.
pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";

/// Errors raised while building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("missing required setting {key}")]
    Missing {
        /// Environment variable or field name.
        key: &'static str,
    },

    /// A setting is outside its allowed range.
    #[error("invalid value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Script-app identity used for the password grant.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How far "load more" placeholders are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandLimit {
    /// Expand every placeholder.
    All,
    /// Issue at most this many more-children requests per post.
    Requests(usize),
}

/// Configuration for one harvester process.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub credentials: Credentials,
    pub user_agent: String,
    /// Host serving `/api/v1/access_token`.
    pub auth_base: String,
    /// Host serving listings and comment trees.
    pub api_base: String,
    /// Requested items per page (clamped to [`MAX_PAGE_SIZE`]).
    pub page_size: u32,
    pub page_delay: Duration,
    pub entity_delay: Duration,
    pub cooldown: Duration,
    pub max_rate_limit_retries: u32,
    /// Zero disables request pacing.
    pub request_interval: Duration,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub expand: ExpandLimit,
    pub output_dir: PathBuf,
}

impl HarvestConfig {
    /// Builds a configuration with default policy values.
    #[must_use]
    pub fn new(credentials: Credentials, user_agent: impl Into<String>) -> Self {
        Self {
            credentials,
            user_agent: user_agent.into(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            entity_delay: DEFAULT_ENTITY_DELAY,
            cooldown: DEFAULT_COOLDOWN,
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            request_interval: DEFAULT_REQUEST_INTERVAL,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            expand: ExpandLimit::All,
            output_dir: PathBuf::from("data/raw"),
        }
    }

    /// Loads `.env` (if present) and reads credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required variable is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(error) => debug!(%error, "no .env loaded"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads credentials through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required key is absent or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing { key })
        };

        let credentials = Credentials {
            client_id: required("REDDIT_CLIENT_ID")?,
            client_secret: required("REDDIT_CLIENT_SECRET")?,
            username: required("REDDIT_USERNAME")?,
            password: required("REDDIT_PASSWORD")?,
        };
        let user_agent = lookup("REDDIT_USER_AGENT")
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| default_user_agent(&credentials.username));

        Ok(Self::new(credentials, user_agent))
    }

    /// Validates ranges and required values.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.client_id.is_empty() {
            return Err(ConfigError::Missing { key: "client_id" });
        }
        if self.credentials.username.is_empty() {
            return Err(ConfigError::Missing { key: "username" });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Missing { key: "user_agent" });
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::out_of_range(
                "page_size",
                self.page_size,
                "1..=100",
            ));
        }
        if self.max_rate_limit_retries > 20 {
            return Err(ConfigError::out_of_range(
                "max_rate_limit_retries",
                self.max_rate_limit_retries,
                "0..=20",
            ));
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        Ok(())
    }

    /// Token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/api/v1/access_token", self.auth_base.trim_end_matches('/'))
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::out_of_range(field, value, "1..=3600"));
    }
    Ok(())
}

/// Default User-Agent, in the `<app>/<version> (by /u/<name>)` form the API asks for.
#[must_use]
pub fn default_user_agent(username: &str) -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("harvester/{version} (by /u/{username})")
}
