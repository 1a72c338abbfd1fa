//! Run orchestration across collection targets.
//!
//! Entities are collected one at a time. For each page the harvester drops
//! ids it already emitted for the entity, expands reply trees when requested,
//! emits the page as one [`Batch`] and logs progress. When the entity is done
//! the sink receives [`EndOfData`]. Entity-scoped failures are logged and the
//! run continues with the next entity; fatal errors end the run.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::paginator::{Pagination, Paginator};
use super::traversal::TreeExpander;
use crate::api::RedditApi;
use crate::config::HarvestConfig;
use crate::dedupe::merge;
use crate::emit::{Batch, BatchSink, EndOfData};
use crate::governor::{CollectError, Governed, Governor};
use crate::model::{Collection, Cursor, ItemKind, Moderator, Record, StopReason};

/// One collection target of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionJob {
    pub collection: Collection,
    /// Maximum number of listing items to collect.
    pub target: usize,
    /// Expand the reply tree of every collected post.
    pub comments: bool,
    /// Continue after this cursor instead of the first page.
    pub resume: Option<Cursor>,
}

impl CollectionJob {
    #[must_use]
    pub fn new(collection: Collection, target: usize) -> Self {
        Self {
            collection,
            target,
            comments: false,
            resume: None,
        }
    }

    #[must_use]
    pub fn with_comments(mut self, comments: bool) -> Self {
        self.comments = comments;
        self
    }

    #[must_use]
    pub fn resume_after(mut self, cursor: Option<Cursor>) -> Self {
        self.resume = cursor;
        self
    }
}

/// How an entity ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum EntityOutcome {
    /// Pagination stopped normally (including missing or private entities).
    Completed { stop: StopReason },
    /// An entity-scoped error ended collection; partial output is incomplete.
    Failed { error: String },
    /// The operator interrupted the run during this entity.
    Interrupted,
}

/// Per-entity result line of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub entity: String,
    /// Records emitted for the entity.
    pub items: usize,
    #[serde(flatten)]
    pub outcome: EntityOutcome,
}

impl EntityReport {
    /// Returns true if the entity produced no usable data.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(
            self.outcome,
            EntityOutcome::Completed {
                stop: StopReason::Unavailable(_)
            } | EntityOutcome::Failed { .. }
        )
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub entities: Vec<EntityReport>,
    pub interrupted: bool,
}

impl RunSummary {
    #[must_use]
    pub fn items(&self) -> usize {
        self.entities.iter().map(|e| e.items).sum()
    }

    #[must_use]
    pub fn collected_entities(&self) -> usize {
        self.entities.len() - self.skipped_entities()
    }

    #[must_use]
    pub fn skipped_entities(&self) -> usize {
        self.entities.iter().filter(|e| e.is_skipped()).count()
    }
}

/// Moderators found across several subreddits.
#[derive(Debug, Default)]
pub struct ModeratorDiscovery {
    /// Deduplicated by name across all subreddits, in first-seen order.
    pub moderators: Vec<Moderator>,
    /// Subreddits whose moderator list could not be fetched.
    pub failures: Vec<EntityReport>,
}

/// Live counters polled by the progress UI.
#[derive(Debug, Default)]
pub struct RunStats {
    entities_total: AtomicUsize,
    entities_done: AtomicUsize,
    items: AtomicUsize,
    skipped: AtomicUsize,
    current: Mutex<String>,
}

impl RunStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entities_total(&self) -> usize {
        self.entities_total.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn entities_done(&self) -> usize {
        self.entities_done.load(Ordering::SeqCst)
    }

    /// Records emitted so far in the run.
    #[must_use]
    pub fn items(&self) -> usize {
        self.items.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Entity currently being collected (empty between entities).
    #[must_use]
    pub fn current(&self) -> String {
        self.current
            .lock()
            .map(|name| name.clone())
            .unwrap_or_default()
    }

    fn set_current(&self, entity: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = entity.to_string();
        }
    }

    fn finish_entity(&self, report: &EntityReport) {
        self.entities_done.fetch_add(1, Ordering::SeqCst);
        if report.is_skipped() {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Drives collection jobs through pagination, traversal and emission.
pub struct Harvester {
    api: Arc<dyn RedditApi>,
    governor: Arc<Governor>,
    paginator: Paginator,
    expander: TreeExpander,
    entity_delay: Duration,
    stats: Arc<RunStats>,
    interrupted: Arc<AtomicBool>,
}

impl Harvester {
    /// Creates a harvester using the pacing and expansion policy of `config`.
    #[must_use]
    pub fn new(api: Arc<dyn RedditApi>, governor: Arc<Governor>, config: &HarvestConfig) -> Self {
        let paginator = Paginator::new(
            Arc::clone(&api),
            Arc::clone(&governor),
            config.page_size,
            config.page_delay,
        );
        let expander = TreeExpander::new(Arc::clone(&api), Arc::clone(&governor), config.expand);
        Self {
            api,
            governor,
            paginator,
            expander,
            entity_delay: config.entity_delay,
            stats: Arc::new(RunStats::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drops replies by `author` from expanded reply trees.
    #[must_use]
    pub fn excluding_author(mut self, author: impl Into<String>) -> Self {
        self.expander = self.expander.excluding_author(author);
        self
    }

    /// Uses `flag` as the operator interrupt signal.
    #[must_use]
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    #[must_use]
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    fn check_interrupt(&self) -> Result<(), CollectError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(CollectError::Interrupted);
        }
        Ok(())
    }

    /// Collects every job in order, pausing between entities.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`CollectError`] (credentials rejected, sink failure).
    /// Batches emitted before the error remain valid.
    pub async fn run(
        &self,
        jobs: &[CollectionJob],
        sink: &mut dyn BatchSink,
    ) -> Result<RunSummary, CollectError> {
        self.stats.entities_total.fetch_add(jobs.len(), Ordering::SeqCst);
        let mut summary = RunSummary::default();

        for (index, job) in jobs.iter().enumerate() {
            if index > 0 && !self.entity_delay.is_zero() {
                tokio::time::sleep(self.entity_delay).await;
            }
            if self.interrupted.load(Ordering::SeqCst) {
                summary.interrupted = true;
                break;
            }

            let entity = job.collection.to_string();
            self.stats.set_current(&entity);
            let mut emitted = 0;
            let report = match self.harvest_entity(job, sink, &mut emitted).await {
                Ok(stop) => EntityReport {
                    entity,
                    items: emitted,
                    outcome: EntityOutcome::Completed { stop },
                },
                Err(CollectError::Interrupted) => {
                    warn!(entity = %entity, emitted, "interrupted, discarding in-progress page");
                    summary.interrupted = true;
                    EntityReport {
                        entity,
                        items: emitted,
                        outcome: EntityOutcome::Interrupted,
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!(entity = %entity, error = %err, "skipping entity after failure");
                    EntityReport {
                        entity,
                        items: emitted,
                        outcome: EntityOutcome::Failed {
                            error: err.to_string(),
                        },
                    }
                }
            };
            self.stats.finish_entity(&report);
            summary.entities.push(report);
            if summary.interrupted {
                break;
            }
        }
        self.stats.set_current("");

        info!(
            collected = summary.collected_entities(),
            skipped = summary.skipped_entities(),
            items = summary.items(),
            rate_limit_retries = self.governor.rate_limit_retries(),
            "run finished"
        );
        Ok(summary)
    }

    /// Collects one entity and signals [`EndOfData`] when it completes.
    #[instrument(skip(self, job, sink, emitted), fields(entity = %job.collection, target = job.target))]
    async fn harvest_entity(
        &self,
        job: &CollectionJob,
        sink: &mut dyn BatchSink,
        emitted: &mut usize,
    ) -> Result<StopReason, CollectError> {
        let entity = job.collection.to_string();
        let stem = job.collection.file_stem();
        let mut state = Pagination::new(job.collection.clone(), job.target);
        if let Some(cursor) = &job.resume {
            state = state.resume_from(cursor.clone());
        }
        let mut seen = HashSet::new();

        while let Some(items) = self.paginator.next_page(&mut state).await? {
            self.check_interrupt()?;
            let (kept, updated) = merge(seen, items);
            seen = updated;

            let mut records = Vec::with_capacity(kept.len());
            for item in kept {
                if job.comments && item.kind == ItemKind::Post {
                    self.check_interrupt()?;
                    records.push(self.expander.expand_tree(&item).await?);
                } else {
                    records.push(Record::from(item));
                }
            }

            let count = records.len();
            if let Some(batch) = Batch::new(&stem, records, *emitted, OffsetDateTime::now_utc()) {
                sink.emit(batch).await?;
                *emitted += count;
                self.stats.items.fetch_add(count, Ordering::SeqCst);
            }
            info!(
                entity = %entity,
                collected = *emitted,
                "collected {} of target {}",
                *emitted,
                display_target(job.target)
            );
        }

        let stop = state.stop_reason().unwrap_or(StopReason::Exhausted);
        match stop {
            StopReason::Unavailable(reason) => {
                warn!(entity = %entity, reason = %reason, "skipping unavailable entity");
            }
            _ => info!(entity = %entity, total = *emitted, stop = %stop, "entity complete"),
        }
        sink.finish(EndOfData {
            entity: stem,
            reason: stop,
            total: *emitted,
        })
        .await?;
        Ok(stop)
    }

    /// Lists the moderators of `subreddit`, deduplicated by name.
    ///
    /// A missing or private subreddit yields an empty list.
    ///
    /// # Errors
    ///
    /// Propagates [`CollectError`] from the governor.
    #[instrument(skip(self))]
    pub async fn discover_moderators(
        &self,
        subreddit: &str,
    ) -> Result<Vec<Moderator>, CollectError> {
        let entity = format!("r/{subreddit}");
        let governed = self
            .governor
            .call("moderators", &entity, |credential| {
                self.api.fetch_moderators(credential, subreddit)
            })
            .await?;
        let moderators = match governed {
            Governed::Value(moderators) => moderators,
            Governed::Missing(reason) => {
                warn!(entity = %entity, reason = %reason, "cannot list moderators");
                Vec::new()
            }
        };
        let (moderators, _) = merge(HashSet::new(), moderators);
        info!(entity = %entity, count = moderators.len(), "moderators discovered");
        Ok(moderators)
    }

    /// Lists the moderators of every subreddit in `subreddits`.
    ///
    /// A subreddit whose list fails to load is reported in
    /// [`ModeratorDiscovery::failures`] and the remaining subreddits are
    /// still queried.
    ///
    /// # Errors
    ///
    /// Returns only fatal errors ([`CollectError::is_fatal`]).
    pub async fn discover_all_moderators(
        &self,
        subreddits: &[String],
    ) -> Result<ModeratorDiscovery, CollectError> {
        let mut discovery = ModeratorDiscovery::default();
        let mut seen = HashSet::new();
        for subreddit in subreddits {
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }
            match self.discover_moderators(subreddit).await {
                Ok(found) => {
                    let (kept, updated) = merge(seen, found);
                    seen = updated;
                    discovery.moderators.extend(kept);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        subreddit = %subreddit,
                        error = %err,
                        "moderator discovery failed, continuing"
                    );
                    discovery.failures.push(EntityReport {
                        entity: format!("r/{subreddit}/about/moderators"),
                        items: 0,
                        outcome: EntityOutcome::Failed {
                            error: err.to_string(),
                        },
                    });
                }
            }
        }
        Ok(discovery)
    }
}

fn display_target(target: usize) -> String {
    if target == usize::MAX {
        "all".to_string()
    } else {
        target.to_string()
    }
}
