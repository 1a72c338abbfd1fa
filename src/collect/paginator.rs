//! Cursor-driven listing pagination.
//!
//! A [`Pagination`] holds the resumable state of one collection walk: the
//! cursor to continue after, how many items were taken, and why the walk
//! stopped. [`Paginator::next_page`] advances it by one page; the walk stops
//! on the first of:
//!
//! 1. the collection is missing or private ([`StopReason::Unavailable`]),
//! 2. an empty page or a page without a cursor ([`StopReason::Exhausted`]),
//! 3. `target` items taken ([`StopReason::TargetReached`]).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::api::{ListingPage, RedditApi};
use crate::config::MAX_PAGE_SIZE;
use crate::governor::{CollectError, Governed, Governor};
use crate::model::{Collection, Cursor, Item, StopReason};

/// Resumable state of one pagination walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    collection: Collection,
    target: usize,
    cursor: Option<Cursor>,
    collected: usize,
    pages: usize,
    stop: Option<StopReason>,
}

impl Pagination {
    /// Starts a walk from the first page.
    #[must_use]
    pub fn new(collection: Collection, target: usize) -> Self {
        Self {
            collection,
            target,
            cursor: None,
            collected: 0,
            pages: 0,
            stop: (target == 0).then_some(StopReason::TargetReached),
        }
    }

    /// Continues a previous walk after `cursor`.
    #[must_use]
    pub fn resume_from(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Cursor to continue after, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    #[must_use]
    pub fn collected(&self) -> usize {
        self.collected
    }

    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Why the walk stopped; `None` while more pages may follow.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stop.is_some()
    }

    fn remaining(&self) -> usize {
        self.target.saturating_sub(self.collected)
    }
}

/// Items of a finished walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub items: Vec<Item>,
    pub stop: StopReason,
}

/// Fetches listing pages through the governor.
#[derive(Clone)]
pub struct Paginator {
    api: Arc<dyn RedditApi>,
    governor: Arc<Governor>,
    page_size: u32,
    page_delay: Duration,
}

impl Paginator {
    /// `page_size` is clamped to `1..=100`.
    #[must_use]
    pub fn new(
        api: Arc<dyn RedditApi>,
        governor: Arc<Governor>,
        page_size: u32,
        page_delay: Duration,
    ) -> Self {
        Self {
            api,
            governor,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            page_delay,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches a single page of at most `page_size` items after `cursor`.
    ///
    /// # Errors
    ///
    /// Propagates [`CollectError`] from the governor.
    pub async fn fetch_page(
        &self,
        collection: &Collection,
        page_size: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Governed<ListingPage>, CollectError> {
        let limit = page_size.clamp(1, MAX_PAGE_SIZE);
        let entity = collection.to_string();
        self.governor
            .call("listing", &entity, |credential| {
                self.api.fetch_listing(credential, collection, limit, cursor)
            })
            .await
    }

    /// Fetches the next page of `state`.
    ///
    /// Sleeps the page delay before every page but the first. Returns the
    /// page's items (never more than the remaining target), or `None` once
    /// the walk is done.
    ///
    /// # Errors
    ///
    /// Propagates [`CollectError`] from the governor; `state` is unchanged.
    #[instrument(skip(self, state), fields(entity = %state.collection, page = state.pages + 1))]
    pub async fn next_page(
        &self,
        state: &mut Pagination,
    ) -> Result<Option<Vec<Item>>, CollectError> {
        if state.is_done() {
            return Ok(None);
        }
        if state.pages > 0 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        let remaining = state.remaining();
        let limit = u32::try_from(remaining)
            .unwrap_or(u32::MAX)
            .min(self.page_size);
        let page = match self
            .fetch_page(&state.collection, limit, state.cursor.as_ref())
            .await?
        {
            Governed::Value(page) => page,
            Governed::Missing(reason) => {
                state.stop = Some(StopReason::Unavailable(reason));
                return Ok(None);
            }
        };
        state.pages += 1;

        if page.items.is_empty() {
            debug!("empty page, collection exhausted");
            state.stop = Some(StopReason::Exhausted);
            return Ok(None);
        }

        let mut items = page.items;
        items.truncate(remaining);
        state.collected += items.len();
        state.cursor = page.after;

        state.stop = if state.cursor.is_none() {
            Some(StopReason::Exhausted)
        } else if state.collected >= state.target {
            Some(StopReason::TargetReached)
        } else {
            None
        };
        debug!(
            items = items.len(),
            collected = state.collected,
            has_more = state.cursor.is_some(),
            "page fetched"
        );
        Ok(Some(items))
    }

    /// Collects up to `target` items of `collection`.
    ///
    /// Exhaustion before the target is not an error; the shorter result is
    /// returned with [`StopReason::Exhausted`].
    ///
    /// # Errors
    ///
    /// Propagates [`CollectError`] from the governor.
    pub async fn collect(
        &self,
        collection: Collection,
        target: usize,
    ) -> Result<Collected, CollectError> {
        let mut state = Pagination::new(collection, target);
        let mut items = Vec::new();
        while let Some(page) = self.next_page(&mut state).await? {
            items.extend(page);
        }
        Ok(Collected {
            items,
            stop: state.stop.unwrap_or(StopReason::Exhausted),
        })
    }
}
