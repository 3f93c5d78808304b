//! Stats command implementation

use crate::error::{Error, Result};
use crate::persist::{CompletedRun, SnapshotStore};
use tracing::info;

/// Load the persisted snapshot of the last completed run
pub async fn cmd_stats(snapshots: &dyn SnapshotStore) -> Result<CompletedRun> {
    info!("Loading persisted statistics");

    snapshots.load_completed().await?.ok_or_else(|| {
        Error::Other("no completed run found; run 'rewatch process <file>' first".to_string())
    })
}

/// Print a stats snapshot for humans
pub fn print_stats(run: &CompletedRun) {
    let stats = &run.stats;

    println!("Viewing history ({} watches)", stats.total_watched);
    println!("  Movies:    {}", stats.movie_count);
    println!("  Series:    {}", stats.series_count);
    if stats.unmatched_count > 0 {
        println!("  Unmatched: {}", stats.unmatched_count);
    }

    if !stats.per_year.is_empty() {
        println!("\nBy year:");
        for (year, count) in &stats.per_year {
            println!("  {}  {}", year, count);
        }
    }

    if !stats.top_by_watch_count.is_empty() {
        println!("\nMost rewatched:");
        for item in &stats.top_by_watch_count {
            println!(
                "  {:>3}x  {} ({})",
                item.watch_count, item.title, item.kind
            );
        }
    }

    if !stats.ongoing_series.is_empty() {
        println!("\nOngoing series:");
        for item in &stats.ongoing_series {
            println!("  {} (last watched {})", item.title, item.last_watched_on);
        }
    }

    println!("\nSaved {}", run.saved_at.format("%Y-%m-%d %H:%M UTC"));
}
