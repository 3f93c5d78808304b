//! Merge store
//!
//! Keyed accumulator that deduplicates enrichment results. The single point
//! of truth for deduplication: the only mutation path is `upsert`, which
//! either constructs an item or bumps its watch count and recency. Updates
//! commute (count increment, date max), so within-batch completion order
//! does not affect the final state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind discriminator for catalog entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Series => write!(f, "series"),
        }
    }
}

/// Deduplication identity of a media item
///
/// Matched records merge under `(external_id, kind)`; records the catalog
/// could not match merge under their original (un-normalized) title.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergeKey {
    Matched { external_id: i64, kind: MediaKind },
    Unmatched { title: String },
}

impl MergeKey {
    pub fn unmatched(title: &str) -> Self {
        MergeKey::Unmatched {
            title: title.to_string(),
        }
    }
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeKey::Matched { external_id, kind } => write!(f, "{}:{}", kind, external_id),
            MergeKey::Unmatched { title } => write!(f, "unmatched:{}", title),
        }
    }
}

/// The merged, enriched unit exposed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Merge-key string; unique across one result set
    pub id: String,
    pub title: String,
    pub kind: MediaKind,
    pub external_id: Option<i64>,
    pub poster_ref: Option<String>,
    pub backdrop_ref: Option<String>,
    pub synopsis: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub first_aired: Option<NaiveDate>,
    pub last_aired: Option<NaiveDate>,
    pub lifecycle_status: Option<String>,
    pub is_ongoing: bool,
    pub last_watched_on: NaiveDate,
    pub rating_average: Option<f32>,
    pub watch_count: u32,
}

impl MediaItem {
    /// Minimal item for a record the catalog could not match
    pub fn unmatched(title: &str, watched_on: NaiveDate) -> Self {
        Self {
            id: MergeKey::unmatched(title).to_string(),
            title: title.to_string(),
            kind: MediaKind::Movie,
            external_id: None,
            poster_ref: None,
            backdrop_ref: None,
            synopsis: None,
            release_date: None,
            first_aired: None,
            last_aired: None,
            lifecycle_status: None,
            is_ongoing: false,
            last_watched_on: watched_on,
            rating_average: None,
            watch_count: 1,
        }
    }
}

/// Keyed accumulator of media items for one processing run
#[derive(Debug, Default)]
pub struct MergeStore {
    items: HashMap<MergeKey, MediaItem>,
}

impl MergeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reseed from checkpointed partial items, preserving tallied counts
    pub fn seed(items: Vec<MediaItem>) -> Self {
        let mut store = Self::new();
        for item in items {
            let key = match (item.external_id, item.id.starts_with("unmatched:")) {
                (Some(external_id), false) => MergeKey::Matched {
                    external_id,
                    kind: item.kind,
                },
                _ => MergeKey::unmatched(&item.title),
            };
            store.items.insert(key, item);
        }
        store
    }

    /// Insert or merge one viewing event
    ///
    /// Absent key: the item from `build` is stored with `watch_count` 1 and
    /// `last_watched_on` set to `watched_on`. Present key: the watch count
    /// increments and `last_watched_on` takes the max; nothing else changes.
    /// Returns the item state after the merge.
    pub fn upsert(
        &mut self,
        key: MergeKey,
        watched_on: NaiveDate,
        build: impl FnOnce() -> MediaItem,
    ) -> &MediaItem {
        let entry = self
            .items
            .entry(key)
            .and_modify(|item| {
                item.watch_count += 1;
                item.last_watched_on = item.last_watched_on.max(watched_on);
            })
            .or_insert_with(|| {
                let mut item = build();
                item.watch_count = 1;
                item.last_watched_on = watched_on;
                item
            });
        entry
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &MergeKey) -> Option<&MediaItem> {
        self.items.get(key)
    }

    /// Items sorted by `last_watched_on` descending, ties broken by title
    pub fn items_by_recency(&self) -> Vec<MediaItem> {
        let mut items: Vec<MediaItem> = self.items.values().cloned().collect();
        items.sort_by(|a, b| {
            b.last_watched_on
                .cmp(&a.last_watched_on)
                .then_with(|| a.title.cmp(&b.title))
        });
        items
    }
}
