//! Typed access to the upstream listing API.
//!
//! Every request resolves to an [`ApiOutcome`]. Rate limits, missing and
//! forbidden resources, and rejected credentials are ordinary variants rather
//! than errors, so the [governor](crate::governor) can dispatch on them.
//!
//! # Architecture
//!
//! - [`RedditApi`] - async trait seam implemented by [`RedditClient`] and by test fakes
//! - [`RedditClient`] - reqwest-based implementation
//! - [`wire`] - JSON decoding into [`Item`](crate::model::Item)s and [`ReplyNode`]s

mod client;
mod error;
pub mod wire;

pub use client::{RedditClient, validate_name};
pub(crate) use client::retry_hint;
pub(crate) use client::MORE_CHILDREN_BATCH;
pub use error::ApiError;
pub use wire::{ListingPage, MoreToken, ReplyNode};

use std::time::Duration;

use async_trait::async_trait;

use crate::auth::Credential;
use crate::model::{Collection, Cursor, Moderator};

/// Classified result of a single upstream request.
#[derive(Debug)]
pub enum ApiOutcome<T> {
    /// The request succeeded.
    Success(T),
    /// HTTP 429. `retry_after` carries the server's hint when present.
    RateLimited { retry_after: Option<Duration> },
    /// The entity does not exist (HTTP 404, or a redirect away from it).
    NotFound,
    /// The entity is private, banned or quarantined (HTTP 403).
    Forbidden,
    /// The bearer credential was rejected (HTTP 401).
    Unauthorized,
    /// Any other failure.
    Error(ApiError),
}

impl<T> ApiOutcome<T> {
    /// Applies a fallible conversion to a successful value.
    pub fn and_then<U, F>(self, f: F) -> ApiOutcome<U>
    where
        F: FnOnce(T) -> Result<U, ApiError>,
    {
        match self {
            Self::Success(value) => match f(value) {
                Ok(converted) => ApiOutcome::Success(converted),
                Err(error) => ApiOutcome::Error(error),
            },
            Self::RateLimited { retry_after } => ApiOutcome::RateLimited { retry_after },
            Self::NotFound => ApiOutcome::NotFound,
            Self::Forbidden => ApiOutcome::Forbidden,
            Self::Unauthorized => ApiOutcome::Unauthorized,
            Self::Error(error) => ApiOutcome::Error(error),
        }
    }

    /// Returns true for [`ApiOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Upstream operations used by the collector.
///
/// Implementations issue exactly one request per call and never retry;
/// retry and skip policy belongs to the governor.
#[async_trait]
pub trait RedditApi: Send + Sync {
    /// Fetches one listing page of at most `limit` items after `after`.
    async fn fetch_listing(
        &self,
        credential: Credential,
        collection: &Collection,
        limit: u32,
        after: Option<&Cursor>,
    ) -> ApiOutcome<ListingPage>;

    /// Fetches the reply tree of a post.
    async fn fetch_comments(&self, credential: Credential, post_id: &str)
    -> ApiOutcome<Vec<ReplyNode>>;

    /// Resolves placeholder children of a post into reply nodes.
    async fn fetch_more_children(
        &self,
        credential: Credential,
        post_id: &str,
        children: &[String],
    ) -> ApiOutcome<Vec<ReplyNode>>;

    /// Lists the moderators of a subreddit.
    async fn fetch_moderators(
        &self,
        credential: Credential,
        subreddit: &str,
    ) -> ApiOutcome<Vec<Moderator>>;
}
