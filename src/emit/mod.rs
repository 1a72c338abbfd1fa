//! Batch hand-off to persistence.
//!
//! The harvester packages every collected page into a [`Batch`] and passes it
//! to a [`BatchSink`]. When an entity is complete the sink receives an
//! explicit [`EndOfData`], which is the only way a sink learns that no more
//! data follows; an empty batch is never constructed.

mod error;
mod json_sink;

pub use error::SinkError;
pub use json_sink::{JsonDirSink, batch_file_name};
pub(crate) use json_sink::{MANIFEST_SUFFIX, write_atomically};

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use crate::model::{Record, StopReason};

/// 1-based inclusive position of a batch within its entity's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceRange {
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for SequenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A non-empty group of records ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    entity: String,
    records: Vec<Record>,
    range: SequenceRange,
    timestamp: OffsetDateTime,
}

impl Batch {
    /// Packages `records` that follow `already_emitted` records of `entity`.
    ///
    /// Returns `None` for an empty record list.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        records: Vec<Record>,
        already_emitted: usize,
        timestamp: OffsetDateTime,
    ) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let range = SequenceRange {
            start: already_emitted + 1,
            end: already_emitted + records.len(),
        };
        Some(Self {
            entity: entity.into(),
            records,
            range,
            timestamp,
        })
    }

    /// File-safe entity stem, e.g. `rust` or `ferris_comments`.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    #[must_use]
    pub fn range(&self) -> SequenceRange {
        self.range
    }

    #[must_use]
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Explicit "no more data" signal for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndOfData {
    pub entity: String,
    #[serde(flatten)]
    pub reason: StopReason,
    /// Records emitted for the entity across all batches.
    pub total: usize,
}

/// Receives batches from the harvester.
///
/// A returned error is fatal to the run.
#[async_trait]
pub trait BatchSink: Send {
    /// Persists one batch.
    async fn emit(&mut self, batch: Batch) -> Result<(), SinkError>;

    /// Marks an entity as complete.
    async fn finish(&mut self, end: EndOfData) -> Result<(), SinkError>;
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub batches: Vec<Batch>,
    pub finished: Vec<EndOfData>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records emitted for `entity`, in emission order.
    #[must_use]
    pub fn records_for(&self, entity: &str) -> Vec<&Record> {
        self.batches
            .iter()
            .filter(|batch| batch.entity() == entity)
            .flat_map(|batch| batch.records().iter())
            .collect()
    }
}

#[async_trait]
impl BatchSink for MemorySink {
    async fn emit(&mut self, batch: Batch) -> Result<(), SinkError> {
        self.batches.push(batch);
        Ok(())
    }

    async fn finish(&mut self, end: EndOfData) -> Result<(), SinkError> {
        self.finished.push(end);
        Ok(())
    }
}
