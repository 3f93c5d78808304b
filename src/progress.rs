//! Progress bar helpers for long-running commands

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Bar tracking records through the enrichment pipeline
pub fn history_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:38.cyan/blue}] {pos}/{len} records {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
