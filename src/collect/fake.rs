//! Scripted in-memory [`RedditApi`] for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiError, ApiOutcome, ListingPage, RedditApi, ReplyNode};
use crate::auth::{Credential, StaticCredential};
use crate::governor::{Governor, GovernorPolicy, RequestPacer, Unavailable};
use crate::model::{Collection, Cursor, Moderator};

#[derive(Default)]
struct State {
    listings: VecDeque<ApiOutcome<ListingPage>>,
    listing_calls: Vec<(String, u32, Option<String>)>,
    unavailable: HashMap<String, Unavailable>,
    comments: HashMap<String, Vec<ReplyNode>>,
    broken_posts: HashSet<String>,
    more: HashMap<String, ReplyNode>,
    broken_children: HashSet<String>,
    more_calls: Vec<Vec<String>>,
    moderators: HashMap<String, Vec<Moderator>>,
    broken_moderators: HashSet<String>,
}

pub(crate) struct FakeApi {
    state: Mutex<State>,
}

#[allow(clippy::unwrap_used)]
impl FakeApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
        })
    }

    pub(crate) fn governor(&self) -> Arc<Governor> {
        Arc::new(Governor::new(
            Arc::new(StaticCredential::new("test-token")),
            Arc::new(RequestPacer::disabled()),
            GovernorPolicy {
                cooldown: Duration::from_millis(1),
                max_rate_limit_retries: 3,
            },
        ))
    }

    /// Queues the next listing page, whatever collection asks for it.
    pub(crate) fn push_listing(&self, page: ListingPage) {
        self.push_listing_outcome(ApiOutcome::Success(page));
    }

    pub(crate) fn push_listing_outcome(&self, outcome: ApiOutcome<ListingPage>) {
        self.state.lock().unwrap().listings.push_back(outcome);
    }

    /// Makes every listing of `collection` answer 403 or 404.
    pub(crate) fn make_unavailable(&self, collection: &Collection, reason: Unavailable) {
        self.state
            .lock()
            .unwrap()
            .unavailable
            .insert(collection.to_string(), reason);
    }

    pub(crate) fn set_comments(&self, post_id: &str, nodes: Vec<ReplyNode>) {
        self.state
            .lock()
            .unwrap()
            .comments
            .insert(post_id.to_string(), nodes);
    }

    pub(crate) fn break_comments(&self, post_id: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_posts
            .insert(post_id.to_string());
    }

    /// Registers the node returned when `id` is requested as a hidden child.
    pub(crate) fn set_more(&self, id: &str, node: ReplyNode) {
        self.state.lock().unwrap().more.insert(id.to_string(), node);
    }

    /// Makes any more-children request containing `id` fail.
    pub(crate) fn break_more(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_children
            .insert(id.to_string());
    }

    pub(crate) fn set_moderators(&self, subreddit: &str, moderators: Vec<Moderator>) {
        self.state
            .lock()
            .unwrap()
            .moderators
            .insert(subreddit.to_string(), moderators);
    }

    pub(crate) fn break_moderators(&self, subreddit: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_moderators
            .insert(subreddit.to_string());
    }

    pub(crate) fn listing_calls(&self) -> usize {
        self.state.lock().unwrap().listing_calls.len()
    }

    pub(crate) fn listing_entities(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.listing_calls.iter().map(|c| c.0.clone()).collect()
    }

    pub(crate) fn listing_limits(&self) -> Vec<u32> {
        let state = self.state.lock().unwrap();
        state.listing_calls.iter().map(|c| c.1).collect()
    }

    pub(crate) fn listing_cursors(&self) -> Vec<Option<String>> {
        let state = self.state.lock().unwrap();
        state.listing_calls.iter().map(|c| c.2.clone()).collect()
    }

    pub(crate) fn more_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().more_calls.clone()
    }
}

#[async_trait]
#[allow(clippy::unwrap_used)]
impl RedditApi for FakeApi {
    async fn fetch_listing(
        &self,
        _credential: Credential,
        collection: &Collection,
        limit: u32,
        after: Option<&Cursor>,
    ) -> ApiOutcome<ListingPage> {
        let mut state = self.state.lock().unwrap();
        let entity = collection.to_string();
        state
            .listing_calls
            .push((entity.clone(), limit, after.map(|c| c.as_str().to_string())));
        match state.unavailable.get(&entity) {
            Some(Unavailable::NotFound) => return ApiOutcome::NotFound,
            Some(Unavailable::Forbidden) => return ApiOutcome::Forbidden,
            None => {}
        }
        state
            .listings
            .pop_front()
            .unwrap_or(ApiOutcome::Success(ListingPage::default()))
    }

    async fn fetch_comments(
        &self,
        _credential: Credential,
        post_id: &str,
    ) -> ApiOutcome<Vec<ReplyNode>> {
        let state = self.state.lock().unwrap();
        if state.broken_posts.contains(post_id) {
            return ApiOutcome::Error(ApiError::http_status(format!("/comments/{post_id}"), 500));
        }
        ApiOutcome::Success(state.comments.get(post_id).cloned().unwrap_or_default())
    }

    async fn fetch_more_children(
        &self,
        _credential: Credential,
        _post_id: &str,
        children: &[String],
    ) -> ApiOutcome<Vec<ReplyNode>> {
        let mut state = self.state.lock().unwrap();
        state.more_calls.push(children.to_vec());
        if children.iter().any(|id| state.broken_children.contains(id)) {
            return ApiOutcome::Error(ApiError::decode("/api/morechildren", "broken subtree"));
        }
        ApiOutcome::Success(
            children
                .iter()
                .filter_map(|id| state.more.get(id).cloned())
                .collect(),
        )
    }

    async fn fetch_moderators(
        &self,
        _credential: Credential,
        subreddit: &str,
    ) -> ApiOutcome<Vec<Moderator>> {
        let state = self.state.lock().unwrap();
        if state.broken_moderators.contains(subreddit) {
            let url = format!("/r/{subreddit}/about/moderators");
            return ApiOutcome::Error(ApiError::http_status(url, 500));
        }
        match state.moderators.get(subreddit) {
            Some(moderators) => ApiOutcome::Success(moderators.clone()),
            None => ApiOutcome::NotFound,
        }
    }
}
