//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::persist::SnapshotStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Checkpoint progress, when an interrupted run exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub processed: usize,
    pub total: usize,
    pub partial_items: usize,
}

/// Completed-run presence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedInfo {
    pub items: usize,
    pub total_watched: u32,
    pub saved_at: String,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub store_dir: String,
    pub catalog_url: String,
    pub credential_present: bool,
    pub checkpoint: Option<CheckpointInfo>,
    pub completed: Option<CompletedInfo>,
}

/// Get system status
pub async fn cmd_status(config: &Config, snapshots: &dyn SnapshotStore) -> Result<StatusInfo> {
    info!("Getting status");

    let checkpoint = snapshots.load_checkpoint().await?.map(|c| CheckpointInfo {
        processed: c.processed_count,
        total: c.records.len(),
        partial_items: c.partial_items.len(),
    });

    let completed = snapshots.load_completed().await?.map(|r| CompletedInfo {
        items: r.items.len(),
        total_watched: r.stats.total_watched,
        saved_at: r.saved_at.to_rfc3339(),
    });

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        store_dir: config.paths.store_dir.display().to_string(),
        catalog_url: config.catalog.base_url.clone(),
        credential_present: config.catalog_api_key().is_some(),
        checkpoint,
        completed,
    })
}

/// Print status for humans
pub fn print_status(status: &StatusInfo) {
    println!("Config:   {}", status.config_path);
    println!("Store:    {}", status.store_dir);
    println!("Catalog:  {}", status.catalog_url);
    println!(
        "Credential: {}",
        if status.credential_present {
            "present"
        } else {
            "MISSING"
        }
    );

    match &status.checkpoint {
        Some(c) => println!(
            "Checkpoint: {}/{} records processed ({} partial titles), 'rewatch resume' to continue",
            c.processed, c.total, c.partial_items
        ),
        None => println!("Checkpoint: none"),
    }

    match &status.completed {
        Some(c) => println!(
            "Completed run: {} titles, {} watches (saved {})",
            c.items, c.total_watched, c.saved_at
        ),
        None => println!("Completed run: none"),
    }
}
