//! Harvester Core Library
//!
//! This library walks Reddit's rate-limited listing API, expands comment
//! trees, deduplicates records and hands them off in batches for downstream
//! labeling.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Explicit run configuration (credentials, pacing, output)
//! - [`auth`] - Bearer token acquisition
//! - [`api`] - Typed requests returning [`ApiOutcome`] variants
//! - [`governor`] - Rate-limit cool-down, skip policy and request pacing
//! - [`collect`] - Pagination, reply tree expansion and run orchestration
//! - [`dedupe`] - Pure id-based merge
//! - [`emit`] - Batches and sinks
//! - [`combine`] - Merging emitted batch files
//! - [`model`] - Items, records and collection targets

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod collect;
pub mod combine;
pub mod config;
pub mod dedupe;
pub mod emit;
pub mod governor;
pub mod model;

// Re-export commonly used types
pub use api::{ApiError, ApiOutcome, RedditApi, RedditClient};
pub use auth::{AuthError, Credential, CredentialSource, StaticCredential, TokenProvider};
pub use collect::{CollectionJob, Harvester, Paginator, RunStats, RunSummary, TreeExpander};
pub use combine::{CombineError, CombineReport, combine};
pub use config::{ConfigError, Credentials, ExpandLimit, HarvestConfig};
pub use dedupe::merge;
pub use emit::{Batch, BatchSink, EndOfData, JsonDirSink, MemorySink, SinkError};
pub use governor::{CollectError, Governed, Governor, GovernorPolicy, RequestPacer, Unavailable};
pub use model::{Collection, Cursor, Item, ItemKind, Moderator, Record, StopReason};
