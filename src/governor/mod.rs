//! Rate-limit and failure governor wrapped around every upstream request.
//!
//! [`Governor::call`] acquires a credential, waits on the shared
//! [`RequestPacer`], issues the request and dispatches on the
//! [`ApiOutcome`]:
//!
//! | Outcome        | Action                                                     |
//! |----------------|------------------------------------------------------------|
//! | `Success`      | value returned                                             |
//! | `RateLimited`  | sleep `max(cooldown, Retry-After)`, reissue; bounded       |
//! | `NotFound`     | [`Governed::Missing`], no retry                            |
//! | `Forbidden`    | [`Governed::Missing`], no retry                            |
//! | `Unauthorized` | invalidate credential, reissue once, then [`CollectError::Auth`] |
//! | `Error`        | logged, [`CollectError::Entity`]                           |
//!
//! A token request answered with 429 goes through the same bounded cool-down
//! as a rate-limited listing request.

mod error;
mod pacer;

pub use error::CollectError;
pub use pacer::{RequestPacer, parse_retry_after};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::api::ApiOutcome;
use crate::auth::{AuthError, Credential, CredentialSource};
use crate::config::{DEFAULT_COOLDOWN, DEFAULT_MAX_RATE_LIMIT_RETRIES, HarvestConfig};

/// Why an entity produced no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    /// The entity does not exist.
    NotFound,
    /// The entity is private, banned or quarantined.
    Forbidden,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Forbidden => f.write_str("forbidden"),
        }
    }
}

/// Result of a governed call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Governed<T> {
    /// The request succeeded.
    Value(T),
    /// The entity is missing or private; treat as empty.
    Missing(Unavailable),
}

impl<T: Default> Governed<T> {
    /// Returns the value, or the empty default for a missing entity.
    pub fn into_value_or_default(self) -> T {
        match self {
            Self::Value(value) => value,
            Self::Missing(_) => T::default(),
        }
    }
}

/// Retry policy of the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorPolicy {
    /// Minimum wait after a rate-limit response.
    pub cooldown: Duration,
    /// Rate-limit retries allowed for one request before giving up.
    pub max_rate_limit_retries: u32,
}

impl Default for GovernorPolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        }
    }
}

impl From<&HarvestConfig> for GovernorPolicy {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            cooldown: config.cooldown,
            max_rate_limit_retries: config.max_rate_limit_retries,
        }
    }
}

/// Supervises upstream calls for one run.
pub struct Governor {
    credentials: Arc<dyn CredentialSource>,
    pacer: Arc<RequestPacer>,
    policy: GovernorPolicy,
    rate_limit_retries: AtomicU32,
}

impl fmt::Debug for Governor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Governor")
            .field("pacer", &self.pacer)
            .field("policy", &self.policy)
            .field("rate_limit_retries", &self.rate_limit_retries)
            .finish_non_exhaustive()
    }
}

impl Governor {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        pacer: Arc<RequestPacer>,
        policy: GovernorPolicy,
    ) -> Self {
        Self {
            credentials,
            pacer,
            policy,
            rate_limit_retries: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn policy(&self) -> GovernorPolicy {
        self.policy
    }

    #[must_use]
    pub fn pacer(&self) -> &RequestPacer {
        &self.pacer
    }

    /// Number of rate-limit retries performed so far in this run.
    #[must_use]
    pub fn rate_limit_retries(&self) -> u32 {
        self.rate_limit_retries.load(Ordering::SeqCst)
    }

    /// Issues `request` under the retry and skip policy.
    ///
    /// `request` is invoked once per attempt with a fresh credential and must
    /// issue the identical upstream call each time.
    ///
    /// # Errors
    ///
    /// - [`CollectError::Auth`] if no credential can be obtained or the
    ///   upstream keeps rejecting it. Only a rejected identity is fatal.
    /// - [`CollectError::RateLimitExceeded`] after
    ///   [`GovernorPolicy::max_rate_limit_retries`] consecutive rate limits.
    /// - [`CollectError::Entity`] for any other failure.
    pub async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        entity: &str,
        mut request: F,
    ) -> Result<Governed<T>, CollectError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = ApiOutcome<T>>,
    {
        let mut rate_limited: u32 = 0;
        let mut reauthenticated = false;

        loop {
            let credential = match self.credentials.acquire().await {
                Ok(credential) => credential,
                Err(AuthError::RateLimited { retry_after }) => {
                    self.cool_down("token", entity, &mut rate_limited, retry_after)
                        .await?;
                    continue;
                }
                Err(err) => {
                    if !err.is_fatal() {
                        warn!(entity, operation, error = %err, "no credential for request");
                    }
                    return Err(err.into());
                }
            };
            self.pacer.acquire().await;

            match request(credential).await {
                ApiOutcome::Success(value) => {
                    if rate_limited > 0 {
                        debug!(
                            entity,
                            operation,
                            retries = rate_limited,
                            "succeeded after rate limit"
                        );
                    }
                    return Ok(Governed::Value(value));
                }
                ApiOutcome::RateLimited { retry_after } => {
                    self.cool_down(operation, entity, &mut rate_limited, retry_after)
                        .await?;
                }
                ApiOutcome::NotFound => {
                    info!(entity, operation, "not found, skipping");
                    return Ok(Governed::Missing(Unavailable::NotFound));
                }
                ApiOutcome::Forbidden => {
                    info!(entity, operation, "forbidden, skipping");
                    return Ok(Governed::Missing(Unavailable::Forbidden));
                }
                ApiOutcome::Unauthorized => {
                    self.credentials.invalidate().await;
                    if reauthenticated {
                        error!(entity, operation, "credential rejected after refresh");
                        return Err(AuthError::rejected(401, "bearer token rejected").into());
                    }
                    debug!(entity, operation, "credential rejected, refreshing");
                    reauthenticated = true;
                }
                ApiOutcome::Error(source) => {
                    error!(entity, operation, error = %source, "request failed");
                    return Err(CollectError::entity(entity, operation, source));
                }
            }
        }
    }

    /// Sleeps `max(cooldown, retry_after)` before the next attempt, or gives
    /// up once `rate_limited` has reached the retry budget.
    async fn cool_down(
        &self,
        operation: &'static str,
        entity: &str,
        rate_limited: &mut u32,
        retry_after: Option<Duration>,
    ) -> Result<(), CollectError> {
        if *rate_limited >= self.policy.max_rate_limit_retries {
            error!(
                entity,
                operation,
                attempts = *rate_limited,
                "rate limit persisted, giving up"
            );
            return Err(CollectError::RateLimitExceeded {
                operation,
                entity: entity.to_string(),
                attempts: *rate_limited,
            });
        }
        *rate_limited += 1;
        self.rate_limit_retries.fetch_add(1, Ordering::SeqCst);
        let delay = retry_after.map_or(self.policy.cooldown, |hint| {
            hint.max(self.policy.cooldown)
        });
        warn!(
            entity,
            operation,
            attempt = *rate_limited,
            delay_ms = delay.as_millis(),
            "rate limited, cooling down"
        );
        self.pacer.record_rate_limit(delay);
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::api::ApiError;
    use crate::auth::StaticCredential;

    struct Script<T> {
        outcomes: Mutex<VecDeque<ApiOutcome<T>>>,
        calls: AtomicUsize,
    }

    impl<T> Script<T> {
        fn new(outcomes: Vec<ApiOutcome<T>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn next(&self) -> ApiOutcome<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ApiOutcome::Error(ApiError::decode("script", "exhausted")))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct CountingSource {
        acquired: AtomicUsize,
        invalidated: AtomicUsize,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn acquire(&self) -> Result<Credential, AuthError> {
            let n = self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Credential::new(format!("token-{n}"), Duration::from_secs(3600)))
        }

        async fn invalidate(&self) {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RejectingSource;

    #[async_trait]
    impl CredentialSource for RejectingSource {
        async fn acquire(&self) -> Result<Credential, AuthError> {
            Err(AuthError::rejected(401, "invalid_grant"))
        }

        async fn invalidate(&self) {}
    }

    /// Rate limits the first `limited` token requests, then issues tokens.
    struct ThrottledSource {
        limited: AtomicUsize,
    }

    #[async_trait]
    impl CredentialSource for ThrottledSource {
        async fn acquire(&self) -> Result<Credential, AuthError> {
            if self.limited.load(Ordering::SeqCst) > 0 {
                self.limited.fetch_sub(1, Ordering::SeqCst);
                return Err(AuthError::RateLimited { retry_after: None });
            }
            Ok(Credential::new("t", Duration::from_secs(3600)))
        }

        async fn invalidate(&self) {}
    }

    struct DownSource;

    #[async_trait]
    impl CredentialSource for DownSource {
        async fn acquire(&self) -> Result<Credential, AuthError> {
            Err(AuthError::Unavailable { status: 503 })
        }

        async fn invalidate(&self) {}
    }

    fn governor_with(source: Arc<dyn CredentialSource>, max_retries: u32) -> Governor {
        Governor::new(
            source,
            Arc::new(RequestPacer::disabled()),
            GovernorPolicy {
                cooldown: Duration::from_millis(1),
                max_rate_limit_retries: max_retries,
            },
        )
    }

    fn governor(max_retries: u32) -> Governor {
        governor_with(Arc::new(StaticCredential::new("t")), max_retries)
    }

    #[tokio::test]
    async fn test_success_passes_value_through() {
        let script = Script::new(vec![ApiOutcome::Success(7)]);
        let result = governor(5)
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap();
        assert_eq!(result, Governed::Value(7));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_then_success_retries_exactly_once() {
        let script = Script::new(vec![
            ApiOutcome::RateLimited { retry_after: None },
            ApiOutcome::Success("page"),
        ]);
        let gov = governor(5);
        let result = gov
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap();
        assert_eq!(result, Governed::Value("page"));
        assert_eq!(script.calls(), 2);
        assert_eq!(gov.rate_limit_retries(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_bounded() {
        let script: Script<u32> = Script::new(
            (0..10)
                .map(|_| ApiOutcome::RateLimited { retry_after: None })
                .collect(),
        );
        let err = governor(3)
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollectError::RateLimitExceeded { attempts: 3, operation: "listing", .. }
        ));
        assert_eq!(script.calls(), 4);
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_cooldown_respects_longer_retry_after() {
        let script = Script::new(vec![
            ApiOutcome::RateLimited {
                retry_after: Some(Duration::from_millis(30)),
            },
            ApiOutcome::Success(()),
        ]);
        let gov = governor(5);
        let start = tokio::time::Instant::now();
        gov.call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert_eq!(gov.pacer().cumulative_delay(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_not_found_and_forbidden_are_not_retried() {
        for (outcome, reason) in [
            (ApiOutcome::NotFound, Unavailable::NotFound),
            (ApiOutcome::Forbidden, Unavailable::Forbidden),
        ] {
            let script: Script<Vec<u32>> = Script::new(vec![outcome]);
            let result = governor(5)
                .call("listing", "r/private", |_| std::future::ready(script.next()))
                .await
                .unwrap();
            assert_eq!(script.calls(), 1);
            assert_eq!(result, Governed::Missing(reason));
            assert!(result.into_value_or_default().is_empty());
        }
    }

    #[tokio::test]
    async fn test_other_error_is_entity_scoped() {
        let script: Script<u32> =
            Script::new(vec![ApiOutcome::Error(ApiError::http_status("http://x", 500))]);
        let err = governor(5)
            .call("comments", "abc", |_| std::future::ready(script.next()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollectError::Entity { ref entity, operation: "comments", .. } if entity == "abc"
        ));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_credential_once() {
        let source = Arc::new(CountingSource::default());
        let script = Script::new(vec![ApiOutcome::Unauthorized, ApiOutcome::Success(1)]);
        let seen = Mutex::new(Vec::new());
        let result = governor_with(source.clone(), 5)
            .call("listing", "r/rust", |credential| {
                seen.lock().unwrap().push(credential.token().to_string());
                std::future::ready(script.next())
            })
            .await
            .unwrap();
        assert_eq!(result, Governed::Value(1));
        assert_eq!(source.invalidated.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), ["token-0", "token-1"]);
    }

    #[tokio::test]
    async fn test_repeated_unauthorized_is_fatal() {
        let script: Script<u32> =
            Script::new(vec![ApiOutcome::Unauthorized, ApiOutcome::Unauthorized]);
        let err = governor(5)
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn test_credential_failure_is_fatal_without_request() {
        let script: Script<u32> = Script::new(vec![ApiOutcome::Success(1)]);
        let err = governor_with(Arc::new(RejectingSource), 5)
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Auth(_)));
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_token_request_is_cooled_down() {
        let source = Arc::new(ThrottledSource {
            limited: AtomicUsize::new(2),
        });
        let script = Script::new(vec![ApiOutcome::Success(1)]);
        let gov = governor_with(source, 5);
        let result = gov
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap();
        assert_eq!(result, Governed::Value(1));
        assert_eq!(gov.rate_limit_retries(), 2);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_persistent_token_rate_limit_is_bounded() {
        let source = Arc::new(ThrottledSource {
            limited: AtomicUsize::new(10),
        });
        let script: Script<u32> = Script::new(vec![ApiOutcome::Success(1)]);
        let err = governor_with(source, 2)
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollectError::RateLimitExceeded { operation: "token", attempts: 2, .. }
        ));
        assert!(!err.is_fatal());
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_endpoint_outage_is_entity_scoped() {
        let script: Script<u32> = Script::new(vec![ApiOutcome::Success(1)]);
        let err = governor_with(Arc::new(DownSource), 5)
            .call("listing", "r/rust", |_| std::future::ready(script.next()))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Auth(AuthError::Unavailable { status: 503 })));
        assert!(!err.is_fatal());
        assert_eq!(script.calls(), 0);
    }
}
