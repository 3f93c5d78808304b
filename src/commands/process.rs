//! Process and resume command implementation
//!
//! Drives a viewing-history export through the enrichment pipeline, wiring
//! the pipeline's callbacks to a progress bar and Ctrl-C to the run's
//! cancellation token.

use crate::catalog::HttpCatalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{read_history, source_digest};
use crate::persist::{CompletedRun, SnapshotStore};
use crate::pipeline::{Pipeline, PipelineHooks, PipelineOutcome};
use crate::progress::history_bar;
use crate::stats::aggregate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Summary of one processing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub total_records: usize,
    pub processed: usize,
    pub items: usize,
    pub unmatched: usize,
    pub cancelled: bool,
}

/// Process a history export from scratch
///
/// Refuses to discard a live checkpoint unless `force` is set: a checkpoint
/// for the same file means `resume` is the right verb, one for a different
/// file means histories would mix.
pub async fn cmd_process(
    config: &Config,
    snapshots: Arc<dyn SnapshotStore>,
    path: &Path,
    force: bool,
) -> Result<ProcessSummary> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
    let digest = source_digest(&bytes);
    let records = read_history(&bytes, &config.ingest)?;
    info!("Read {} records from {}", records.len(), path.display());

    if let Some(checkpoint) = snapshots.load_checkpoint().await? {
        if !force {
            if checkpoint.source_digest == digest {
                return Err(Error::Other(
                    "an interrupted run for this file exists; use 'rewatch resume' \
                     or pass --force to start over"
                        .to_string(),
                ));
            }
            return Err(Error::CheckpointMismatch);
        }
        snapshots.clear_checkpoint().await?;
    }

    let pipeline = build_pipeline(config, snapshots.clone())?;
    let total = records.len();
    let outcome = execute(pipeline, total, |pipeline, token, hooks| async move {
        pipeline.run(records, digest, &token, &hooks).await
    })
    .await?;

    finalize(config, snapshots, outcome, total).await
}

/// Continue an interrupted run from its checkpoint
pub async fn cmd_resume(
    config: &Config,
    snapshots: Arc<dyn SnapshotStore>,
) -> Result<ProcessSummary> {
    let checkpoint = snapshots
        .load_checkpoint()
        .await?
        .ok_or(Error::NoCheckpoint)?;

    let pipeline = build_pipeline(config, snapshots.clone())?;
    let total = checkpoint.records.len();
    let outcome = execute(pipeline, total, |pipeline, token, hooks| async move {
        pipeline.resume(checkpoint, &token, &hooks).await
    })
    .await?;

    finalize(config, snapshots, outcome, total).await
}

fn build_pipeline(config: &Config, snapshots: Arc<dyn SnapshotStore>) -> Result<Arc<Pipeline>> {
    let api_key = config.catalog_api_key();
    if api_key.is_none() {
        warn!(
            "No catalog credential in ${}; lookups will likely fail and \
             titles will appear unmatched",
            config.catalog.api_key_env
        );
    }

    let catalog = HttpCatalog::new(&config.catalog, api_key)?;
    Ok(Arc::new(Pipeline::new(
        Arc::new(catalog),
        snapshots,
        config.pipeline.clone(),
    )))
}

/// Run the pipeline with a progress bar and Ctrl-C cancellation
async fn execute<F, Fut>(pipeline: Arc<Pipeline>, total: usize, run: F) -> Result<PipelineOutcome>
where
    F: FnOnce(Arc<Pipeline>, CancellationToken, PipelineHooks) -> Fut,
    Fut: std::future::Future<Output = Result<PipelineOutcome>>,
{
    let token = CancellationToken::new();

    let ctrl_c_token = token.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested; finishing the current batch");
            ctrl_c_token.cancel();
        }
    });

    let bar = history_bar(total as u64);
    let progress_bar = bar.clone();
    let discovery_bar = bar.clone();
    let hooks = PipelineHooks::new()
        .on_progress(move |processed, _total| progress_bar.set_position(processed as u64))
        .on_item(move |item| discovery_bar.set_message(item.title.clone()));

    let outcome = run(pipeline, token, hooks).await;
    ctrl_c.abort();
    bar.finish_and_clear();
    outcome
}

async fn finalize(
    config: &Config,
    snapshots: Arc<dyn SnapshotStore>,
    outcome: PipelineOutcome,
    total_records: usize,
) -> Result<ProcessSummary> {
    let unmatched = outcome
        .items
        .iter()
        .filter(|i| i.external_id.is_none())
        .count();

    if !outcome.cancelled {
        let stats = aggregate(&outcome.items, config.stats.top_count);
        let run = CompletedRun::new(outcome.items.clone(), stats);
        snapshots.save_completed(&run).await?;
        info!("Saved {} enriched items", run.items.len());
    }

    Ok(ProcessSummary {
        total_records,
        processed: outcome.processed,
        items: outcome.items.len(),
        unmatched,
        cancelled: outcome.cancelled,
    })
}

/// Print a run summary for humans
pub fn print_process_summary(summary: &ProcessSummary) {
    if summary.cancelled {
        println!(
            "Cancelled after {}/{} records; progress saved, run 'rewatch resume' to continue",
            summary.processed, summary.total_records
        );
        return;
    }

    println!(
        "✓ Processed {} records into {} titles",
        summary.processed, summary.items
    );
    if summary.unmatched > 0 {
        println!(
            "  {} title(s) had no catalog match and carry minimal metadata",
            summary.unmatched
        );
    }
    println!("  Run 'rewatch stats' to see the breakdown");
}
