//! rewatch - viewing-history enrichment and statistics
//!
//! Ingests a user-exported viewing-history CSV, enriches each title against
//! an external catalog service, merges repeat watches, and aggregates the
//! result into summary statistics. Runs are checkpointed and resumable.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod stats;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{read_history, source_digest, ViewingRecord};
pub use normalize::normalize_title;
pub use pipeline::{Pipeline, PipelineHooks, PipelineOutcome, ProcessingCheckpoint, RunState};
pub use stats::{aggregate, StatsSnapshot};
pub use store::{MediaItem, MediaKind, MergeKey, MergeStore};
