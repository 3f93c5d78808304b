//! Clear command implementation

use crate::error::Result;
use crate::persist::SnapshotStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What was removed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearStats {
    pub checkpoint_removed: bool,
    pub completed_removed: bool,
}

/// Drop persisted state
///
/// With `checkpoint_only`, the completed results survive and only the
/// interrupted-run checkpoint is discarded.
pub async fn cmd_clear(snapshots: &dyn SnapshotStore, checkpoint_only: bool) -> Result<ClearStats> {
    let had_checkpoint = snapshots.load_checkpoint().await?.is_some();
    snapshots.clear_checkpoint().await?;
    info!("Cleared checkpoint");

    let mut completed_removed = false;
    if !checkpoint_only {
        completed_removed = snapshots.load_completed().await?.is_some();
        snapshots.clear_completed().await?;
        info!("Cleared completed results");
    }

    Ok(ClearStats {
        checkpoint_removed: had_checkpoint,
        completed_removed,
    })
}

/// Print clear results for humans
pub fn print_clear_stats(stats: &ClearStats) {
    match (stats.checkpoint_removed, stats.completed_removed) {
        (false, false) => println!("Nothing to clear"),
        (checkpoint, completed) => {
            if checkpoint {
                println!("✓ Checkpoint cleared");
            }
            if completed {
                println!("✓ Completed results cleared");
            }
        }
    }
}
