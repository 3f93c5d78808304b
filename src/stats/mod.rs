//! Statistics aggregation
//!
//! Pure reduction over a merged item collection. Deterministic, no I/O;
//! histograms bucket `last_watched_on` by calendar day, month, and year.

use crate::store::{MediaItem, MediaKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only aggregate over one result set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_watched: u32,
    pub movie_count: u32,
    pub series_count: u32,
    pub unmatched_count: u32,
    /// Watch events per day (`YYYY-MM-DD`)
    pub per_day: BTreeMap<String, u32>,
    /// Watch events per month (`YYYY-MM`)
    pub per_month: BTreeMap<String, u32>,
    /// Watch events per year (`YYYY`)
    pub per_year: BTreeMap<String, u32>,
    /// Most-rewatched items, watch count descending
    pub top_by_watch_count: Vec<MediaItem>,
    /// Ongoing series, most recently watched first
    pub ongoing_series: Vec<MediaItem>,
}

/// Reduce a merged item collection into a snapshot
///
/// `top_count` bounds the rewatch ranking (ties broken by recency, then
/// title, for determinism). Empty input yields an all-zero snapshot.
pub fn aggregate(items: &[MediaItem], top_count: usize) -> StatsSnapshot {
    let mut snapshot = StatsSnapshot::default();

    for item in items {
        snapshot.total_watched += item.watch_count;
        if item.external_id.is_none() {
            snapshot.unmatched_count += 1;
        }
        match item.kind {
            MediaKind::Movie => snapshot.movie_count += 1,
            MediaKind::Series => snapshot.series_count += 1,
        }

        let day = item.last_watched_on.format("%Y-%m-%d").to_string();
        let month = item.last_watched_on.format("%Y-%m").to_string();
        let year = item.last_watched_on.format("%Y").to_string();
        *snapshot.per_day.entry(day).or_default() += item.watch_count;
        *snapshot.per_month.entry(month).or_default() += item.watch_count;
        *snapshot.per_year.entry(year).or_default() += item.watch_count;
    }

    let mut ranked: Vec<MediaItem> = items.to_vec();
    ranked.sort_by(|a, b| {
        b.watch_count
            .cmp(&a.watch_count)
            .then_with(|| b.last_watched_on.cmp(&a.last_watched_on))
            .then_with(|| a.title.cmp(&b.title))
    });
    ranked.truncate(top_count);
    snapshot.top_by_watch_count = ranked;

    let mut ongoing: Vec<MediaItem> = items
        .iter()
        .filter(|i| i.kind == MediaKind::Series && i.is_ongoing)
        .cloned()
        .collect();
    ongoing.sort_by(|a, b| {
        b.last_watched_on
            .cmp(&a.last_watched_on)
            .then_with(|| a.title.cmp(&b.title))
    });
    snapshot.ongoing_series = ongoing;

    snapshot
}
