//! Collection engine: pagination, reply tree expansion and run orchestration.
//!
//! # Architecture
//!
//! - [`Paginator`] - walks a listing page by page with a resumable [`Pagination`]
//! - [`TreeExpander`] - resolves "load more" placeholders and nests replies
//! - [`Harvester`] - runs [`CollectionJob`]s, deduplicates, emits batches
//!
//! Every upstream request goes through the shared
//! [`Governor`](crate::governor::Governor).

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fake;
mod harvester;
mod paginator;
mod traversal;

pub use harvester::{
    CollectionJob, EntityOutcome, EntityReport, Harvester, ModeratorDiscovery, RunStats,
    RunSummary,
};
pub use paginator::{Collected, Pagination, Paginator};
pub use traversal::{TreeExpander, build_tree};
