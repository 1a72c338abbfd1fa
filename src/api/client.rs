//! reqwest-based implementation of [`RedditApi`].

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, redirect};
use tracing::{debug, instrument, warn};
use url::Url;

use super::wire::{self, ListingPage, ReplyNode};
use super::{ApiError, ApiOutcome, RedditApi};
use crate::auth::Credential;
use crate::config::{HarvestConfig, MAX_PAGE_SIZE};
use crate::governor::parse_retry_after;
use crate::model::{Collection, Cursor, Moderator};

/// Subreddit and user names the API accepts.
#[allow(clippy::expect_used)]
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{2,32}$").expect("name regex is valid") // Static pattern, safe to panic
});

/// Header carrying seconds until the rate-limit window resets.
const RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Upper bound of ids per more-children request.
pub(crate) const MORE_CHILDREN_BATCH: usize = 100;

/// Checks that a subreddit or user name can be placed in a request path.
///
/// # Errors
///
/// Returns [`ApiError::InvalidName`] for names outside `[A-Za-z0-9_-]{2,32}`.
///
/// # Example
///
/// ```
/// use harvester_core::api::validate_name;
///
/// assert!(validate_name("rust").is_ok());
/// assert!(validate_name("../admin").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<(), ApiError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ApiError::invalid_name(name))
    }
}

/// HTTP client for the OAuth listing API.
///
/// Created once per run and shared; reqwest pools connections underneath.
#[derive(Debug, Clone)]
pub struct RedditClient {
    client: Client,
    api_base: String,
    user_agent: String,
}

impl RedditClient {
    /// Creates a client from the run configuration.
    ///
    /// Redirects are not followed: the API answers unknown subreddits with a
    /// redirect to its search page, which is reported as [`ApiOutcome::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &HarvestConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(redirect::Policy::none())
            .gzip(true)
            .build()
            .map_err(|source| ApiError::Client { source })?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let raw = format!("{}{path}", self.api_base);
        let mut url = Url::parse(&raw).map_err(|err| ApiError::decode(&raw, err.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("raw_json", "1");
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Issues one GET and classifies the response.
    #[instrument(skip(self, credential), fields(url = %url))]
    async fn get(&self, credential: &Credential, url: Url) -> ApiOutcome<String> {
        let response = match self
            .client
            .get(url.clone())
            .bearer_auth(credential.token())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => return ApiOutcome::Error(ApiError::network(url.as_str(), source)),
        };

        let status = response.status().as_u16();
        debug!(status, "response received");
        match status {
            200..=299 => match response.text().await {
                Ok(body) => ApiOutcome::Success(body),
                Err(source) => ApiOutcome::Error(ApiError::network(url.as_str(), source)),
            },
            301 | 302 | 303 | 307 | 308 | 404 => ApiOutcome::NotFound,
            401 => ApiOutcome::Unauthorized,
            403 => ApiOutcome::Forbidden,
            429 => {
                let retry_after = retry_hint(response.headers());
                warn!(retry_after_secs = ?retry_after.map(|d| d.as_secs()), "rate limited");
                ApiOutcome::RateLimited { retry_after }
            }
            _ => ApiOutcome::Error(ApiError::http_status(url.as_str(), status)),
        }
    }

    async fn get_decoded<T, F>(
        &self,
        credential: &Credential,
        url: Result<Url, ApiError>,
        decode: F,
    ) -> ApiOutcome<T>
    where
        F: FnOnce(&str) -> Result<T, String>,
    {
        let url = match url {
            Ok(url) => url,
            Err(error) => return ApiOutcome::Error(error),
        };
        let display = url.to_string();
        self.get(credential, url)
            .await
            .and_then(|body| decode(&body).map_err(|message| ApiError::decode(display, message)))
    }
}

/// Server-provided wait before retrying a 429.
///
/// Prefers `Retry-After`; falls back to the API's `x-ratelimit-reset` seconds.
pub(crate) fn retry_hint(headers: &HeaderMap) -> Option<Duration> {
    if let Some(value) = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok())
        && let Some(delay) = parse_retry_after(value)
    {
        return Some(delay);
    }
    headers
        .get(RATELIMIT_RESET)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .and_then(|secs| parse_retry_after(&format!("{}", secs.ceil())))
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn fetch_listing(
        &self,
        credential: Credential,
        collection: &Collection,
        limit: u32,
        after: Option<&Cursor>,
    ) -> ApiOutcome<ListingPage> {
        if let Err(error) = validate_name(collection.name()) {
            return ApiOutcome::Error(error);
        }
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(cursor) = after {
            query.push(("after", cursor.as_str()));
        }
        let url = self.endpoint(&collection.path(), &query);
        self.get_decoded(&credential, url, wire::decode_listing).await
    }

    async fn fetch_comments(
        &self,
        credential: Credential,
        post_id: &str,
    ) -> ApiOutcome<Vec<ReplyNode>> {
        let url = self.endpoint(&format!("/comments/{post_id}"), &[]);
        self.get_decoded(&credential, url, wire::decode_comment_tree)
            .await
    }

    async fn fetch_more_children(
        &self,
        credential: Credential,
        post_id: &str,
        children: &[String],
    ) -> ApiOutcome<Vec<ReplyNode>> {
        let link_id = format!("t3_{post_id}");
        let ids = children[..children.len().min(MORE_CHILDREN_BATCH)].join(",");
        let url = self.endpoint(
            "/api/morechildren",
            &[
                ("api_type", "json"),
                ("link_id", link_id.as_str()),
                ("children", ids.as_str()),
            ],
        );
        self.get_decoded(&credential, url, wire::decode_more_children)
            .await
    }

    async fn fetch_moderators(
        &self,
        credential: Credential,
        subreddit: &str,
    ) -> ApiOutcome<Vec<Moderator>> {
        if let Err(error) = validate_name(subreddit) {
            return ApiOutcome::Error(error);
        }
        let url = self.endpoint(&format!("/r/{subreddit}/about/moderators"), &[]);
        self.get_decoded(&credential, url, wire::decode_moderators)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::config::Credentials;

    fn client() -> RedditClient {
        let credentials = Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            username: "ferris".into(),
            password: "pw".into(),
        };
        let mut config = HarvestConfig::new(credentials, "test-agent");
        config.api_base = "http://127.0.0.1:1/".into();
        RedditClient::new(&config).unwrap()
    }

    #[test]
    fn test_validate_name_accepts_typical_names() {
        for name in ["rust", "AskReddit", "DC_Cinematic", "some-user", "ab"] {
            assert!(validate_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_validate_name_rejects_path_tricks() {
        let too_long = "x".repeat(33);
        for name in ["", "a", "../x", "r/rust", "name with space", too_long.as_str()] {
            assert!(validate_name(name).is_err(), "{name}");
        }
    }

    #[test]
    fn test_endpoint_appends_raw_json_and_query() {
        let url = client()
            .endpoint("/r/rust/new", &[("limit", "100"), ("after", "t3_x")])
            .unwrap();
        assert_eq!(url.path(), "/r/rust/new");
        assert_eq!(url.query(), Some("raw_json=1&limit=100&after=t3_x"));
    }

    #[test]
    fn test_retry_hint_prefers_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        headers.insert(RATELIMIT_RESET, HeaderValue::from_static("100"));
        assert_eq!(retry_hint(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_hint_falls_back_to_reset_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RATELIMIT_RESET, HeaderValue::from_static("12.4"));
        assert_eq!(retry_hint(&headers), Some(Duration::from_secs(13)));
    }

    #[test]
    fn test_retry_hint_absent() {
        assert_eq!(retry_hint(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_fetch_listing_invalid_name_is_error_without_request() {
        let outcome = client()
            .fetch_listing(
                Credential::new("t", Duration::from_secs(3600)),
                &Collection::Subreddit("../etc".into()),
                10,
                None,
            )
            .await;
        assert!(matches!(outcome, ApiOutcome::Error(ApiError::InvalidName { .. })));
    }
}
