//! Batch scheduler
//!
//! Drives viewing records through normalization, catalog lookup, and the
//! merge store: concurrency-bounded batches with fan-out inside each batch,
//! paced batch-to-batch, cooperatively cancellable at batch boundaries, and
//! checkpointed so an interrupted run resumes without losing tallies.

use crate::catalog::{is_ongoing, select_match, CatalogClient, CatalogMatch, SeriesDetail};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::ingest::ViewingRecord;
use crate::normalize::normalize_title;
use crate::persist::{checkpoint_best_effort, SnapshotStore};
use crate::store::{MediaItem, MediaKind, MergeKey, MergeStore};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Durable snapshot of one in-flight run
///
/// `processed_count` is the index into `records` from which processing must
/// continue; `partial_items` reseeds the merge store so tallied watch
/// counts are not lost. `source_digest` binds the checkpoint to one export
/// file so a resume never mixes histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingCheckpoint {
    pub records: Vec<ViewingRecord>,
    pub processed_count: usize,
    pub partial_items: Vec<MediaItem>,
    pub active: bool,
    pub source_digest: String,
}

/// Scheduler state, observable by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Final result of one run
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Merged items, most recently watched first
    pub items: Vec<MediaItem>,
    pub cancelled: bool,
    /// Records processed, including any resumed offset
    pub processed: usize,
}

type ProgressFn = dyn Fn(usize, usize) + Send + Sync;
type DiscoveryFn = dyn Fn(&MediaItem) + Send + Sync;

/// Host callbacks, invoked on the scheduler's own task, never concurrently
///
/// The discovery callback fires for a superset of the items created or
/// updated in a batch; consumers must not rely on exact call counts.
#[derive(Default)]
pub struct PipelineHooks {
    on_progress: Option<Box<ProgressFn>>,
    on_item: Option<Box<DiscoveryFn>>,
}

impl PipelineHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_item(mut self, f: impl Fn(&MediaItem) + Send + Sync + 'static) -> Self {
        self.on_item = Some(Box::new(f));
        self
    }

    fn progress(&self, processed: usize, total: usize) {
        if let Some(f) = &self.on_progress {
            f(processed, total);
        }
    }

    fn item(&self, item: &MediaItem) {
        if let Some(f) = &self.on_item {
            f(item);
        }
    }
}

/// The enrichment pipeline scheduler
///
/// At most one run may be in flight per value; a second call fails with
/// `Error::PipelineBusy` rather than corrupting shared state.
pub struct Pipeline {
    catalog: Arc<dyn CatalogClient>,
    snapshots: Arc<dyn SnapshotStore>,
    config: PipelineConfig,
    in_flight: AtomicBool,
    state: Mutex<RunState>,
}

/// Clears the in-flight flag on every exit path
struct RunSlot<'a>(&'a AtomicBool);

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        snapshots: Arc<dyn SnapshotStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            snapshots,
            config,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Process a fresh record set end to end
    pub async fn run(
        &self,
        records: Vec<ViewingRecord>,
        source_digest: String,
        token: &CancellationToken,
        hooks: &PipelineHooks,
    ) -> Result<PipelineOutcome> {
        self.drive(records, 0, Vec::new(), source_digest, token, hooks)
            .await
    }

    /// Re-enter a run from a persisted checkpoint
    pub async fn resume(
        &self,
        checkpoint: ProcessingCheckpoint,
        token: &CancellationToken,
        hooks: &PipelineHooks,
    ) -> Result<PipelineOutcome> {
        info!(
            "Resuming from checkpoint: {}/{} records processed",
            checkpoint.processed_count,
            checkpoint.records.len()
        );
        self.drive(
            checkpoint.records,
            checkpoint.processed_count,
            checkpoint.partial_items,
            checkpoint.source_digest,
            token,
            hooks,
        )
        .await
    }

    async fn drive(
        &self,
        records: Vec<ViewingRecord>,
        start_index: usize,
        partial_items: Vec<MediaItem>,
        source_digest: String,
        token: &CancellationToken,
        hooks: &PipelineHooks,
    ) -> Result<PipelineOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::PipelineBusy);
        }
        let _slot = RunSlot(&self.in_flight);
        self.set_state(RunState::Running);

        let total = records.len();
        let start_index = start_index.min(total);
        let mut store = MergeStore::seed(partial_items);
        let mut processed = start_index;

        debug!(
            "Starting run: {} records, offset {}, batch size {}",
            total, start_index, self.config.batch_size
        );

        // A live checkpoint exists for the whole duration of the run
        self.write_checkpoint(&records, processed, &store, &source_digest)
            .await;

        let batches: Vec<&[ViewingRecord]> = records[start_index..]
            .chunks(self.config.batch_size)
            .collect();

        for (batch_index, batch) in batches.iter().enumerate() {
            if token.is_cancelled() {
                return Ok(self
                    .finish_cancelled(&records, processed, &store, &source_digest)
                    .await);
            }

            if batch_index > 0 {
                // Never hog the executor, and pace the external service
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }

            let touched = self.process_batch(batch, &mut store).await;
            processed += batch.len();

            // In-flight lookups complete before cancellation is honored;
            // their merges count, but no further callbacks fire.
            if token.is_cancelled() {
                return Ok(self
                    .finish_cancelled(&records, processed, &store, &source_digest)
                    .await);
            }

            hooks.progress(processed, total);
            for key in &touched {
                if let Some(item) = store.get(key) {
                    hooks.item(item);
                }
            }

            if (batch_index + 1) % self.config.checkpoint_every_batches == 0 {
                self.write_checkpoint(&records, processed, &store, &source_digest)
                    .await;
            }
        }

        if let Err(e) = self.snapshots.clear_checkpoint().await {
            warn!("Failed to clear checkpoint after completion: {}", e);
        }
        self.set_state(RunState::Completed);

        let items = store.items_by_recency();
        info!("Run complete: {} records -> {} items", processed, items.len());

        Ok(PipelineOutcome {
            items,
            cancelled: false,
            processed,
        })
    }

    /// Fan out lookups for one batch, then merge in record order
    ///
    /// Returns the merge keys touched by this batch, deduplicated.
    async fn process_batch(
        &self,
        batch: &[ViewingRecord],
        store: &mut MergeStore,
    ) -> Vec<MergeKey> {
        let lookups = batch.iter().map(|record| {
            let catalog = Arc::clone(&self.catalog);
            async move {
                let query = normalize_title(&record.title);
                let candidates = catalog.search(&query).await;
                (record, candidates)
            }
        });
        let results = join_all(lookups).await;

        // Series detail is fetched at most once per external id per batch
        let mut detail_cache: HashMap<i64, Option<SeriesDetail>> = HashMap::new();
        let mut touched: Vec<MergeKey> = Vec::new();

        for (record, candidates) in results {
            let key = match select_match(&candidates) {
                Some(matched) => {
                    let detail = if matched.kind == MediaKind::Series {
                        match detail_cache.get(&matched.external_id) {
                            Some(cached) => cached.clone(),
                            None => {
                                let fetched =
                                    self.catalog.series_detail(matched.external_id).await;
                                detail_cache.insert(matched.external_id, fetched.clone());
                                fetched
                            }
                        }
                    } else {
                        None
                    };

                    let key = MergeKey::Matched {
                        external_id: matched.external_id,
                        kind: matched.kind,
                    };
                    store.upsert(key.clone(), record.watched_on, || {
                        item_from_match(matched, detail.as_ref(), record.watched_on)
                    });
                    key
                }
                None => {
                    // Degrade to a minimal item keyed by the original title
                    let key = MergeKey::unmatched(&record.title);
                    store.upsert(key.clone(), record.watched_on, || {
                        MediaItem::unmatched(&record.title, record.watched_on)
                    });
                    key
                }
            };

            if !touched.contains(&key) {
                touched.push(key);
            }
        }

        touched
    }

    async fn finish_cancelled(
        &self,
        records: &[ViewingRecord],
        processed: usize,
        store: &MergeStore,
        source_digest: &str,
    ) -> PipelineOutcome {
        info!("Run cancelled at {}/{} records", processed, records.len());
        // Leave a fresh checkpoint behind so resume picks up exactly here
        self.write_checkpoint(records, processed, store, source_digest)
            .await;
        self.set_state(RunState::Cancelled);

        PipelineOutcome {
            items: store.items_by_recency(),
            cancelled: true,
            processed,
        }
    }

    async fn write_checkpoint(
        &self,
        records: &[ViewingRecord],
        processed: usize,
        store: &MergeStore,
        source_digest: &str,
    ) {
        let checkpoint = ProcessingCheckpoint {
            records: records.to_vec(),
            processed_count: processed,
            partial_items: store.items_by_recency(),
            active: true,
            source_digest: source_digest.to_string(),
        };
        checkpoint_best_effort(self.snapshots.as_ref(), &checkpoint).await;
    }
}

/// Build a merged item from the selected catalog match
fn item_from_match(
    matched: &CatalogMatch,
    detail: Option<&SeriesDetail>,
    watched_on: NaiveDate,
) -> MediaItem {
    let key = MergeKey::Matched {
        external_id: matched.external_id,
        kind: matched.kind,
    };

    MediaItem {
        id: key.to_string(),
        title: matched.display_title.clone(),
        kind: matched.kind,
        external_id: Some(matched.external_id),
        poster_ref: matched.poster_ref.clone(),
        backdrop_ref: matched.backdrop_ref.clone(),
        synopsis: matched.synopsis.clone(),
        release_date: matched.release_date,
        first_aired: matched.first_aired,
        last_aired: detail
            .and_then(|d| d.last_aired)
            .or(matched.last_aired),
        lifecycle_status: detail.and_then(|d| d.lifecycle_status.clone()),
        is_ongoing: is_ongoing(detail),
        last_watched_on: watched_on,
        rating_average: matched.rating_average,
        watch_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(title: &str, watched_on: NaiveDate) -> ViewingRecord {
        ViewingRecord {
            title: title.to_string(),
            watched_on,
        }
    }

    /// Catalog stub: titles containing "Show" match a fixed series, titles
    /// containing "Film" a fixed movie, everything else misses.
    struct StubCatalog {
        searches: AtomicUsize,
        detail_fetches: AtomicUsize,
    }

    impl StubCatalog {
        fn new() -> Self {
            Self {
                searches: AtomicUsize::new(0),
                detail_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for StubCatalog {
        async fn search(&self, query: &str) -> Vec<CatalogMatch> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            if query.contains("Show") {
                vec![CatalogMatch {
                    external_id: 7,
                    kind: MediaKind::Series,
                    display_title: "Show".to_string(),
                    poster_ref: Some("/show.jpg".to_string()),
                    backdrop_ref: None,
                    synopsis: None,
                    release_date: None,
                    first_aired: NaiveDate::from_ymd_opt(2020, 1, 1),
                    last_aired: None,
                    lifecycle_status: None,
                    rating_average: Some(8.0),
                }]
            } else if query.contains("Film") {
                vec![CatalogMatch {
                    external_id: 42,
                    kind: MediaKind::Movie,
                    display_title: "Film".to_string(),
                    poster_ref: None,
                    backdrop_ref: None,
                    synopsis: None,
                    release_date: NaiveDate::from_ymd_opt(2019, 6, 1),
                    first_aired: None,
                    last_aired: None,
                    lifecycle_status: None,
                    rating_average: None,
                }]
            } else {
                Vec::new()
            }
        }

        async fn series_detail(&self, _external_id: i64) -> Option<SeriesDetail> {
            self.detail_fetches.fetch_add(1, Ordering::SeqCst);
            Some(SeriesDetail {
                lifecycle_status: Some("Returning Series".to_string()),
                in_production: false,
                last_aired: NaiveDate::from_ymd_opt(2024, 1, 1),
            })
        }
    }

    fn fast_config(batch_size: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            batch_delay_ms: 0,
            checkpoint_every_batches: 1,
        }
    }

    fn pipeline(batch_size: usize) -> (Pipeline, Arc<MemoryStore>) {
        let snapshots = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(
            Arc::new(StubCatalog::new()),
            snapshots.clone(),
            fast_config(batch_size),
        );
        (pipeline, snapshots)
    }

    #[tokio::test]
    async fn test_merges_episodes_of_one_series() {
        let (pipeline, snapshots) = pipeline(40);
        let records = vec![
            record("Show S1:E2", date(2024, 1, 1)),
            record("Show (Limited Series)", date(2024, 1, 5)),
        ];

        let outcome = pipeline
            .run(records, "digest".into(), &CancellationToken::new(), &PipelineHooks::new())
            .await
            .unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.items.len(), 1);
        let item = &outcome.items[0];
        assert_eq!(item.id, "series:7");
        assert_eq!(item.watch_count, 2);
        assert_eq!(item.last_watched_on, date(2024, 1, 5));
        assert!(item.is_ongoing);
        assert_eq!(pipeline.state(), RunState::Completed);

        // Completion clears the checkpoint
        assert!(snapshots.load_checkpoint().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unmatched_fallback_keying() {
        let (pipeline, _) = pipeline(40);
        let records = vec![
            record("Obscure Thing", date(2024, 1, 1)),
            record("Obscure Thing", date(2024, 1, 2)),
            record("Other Thing", date(2024, 1, 3)),
        ];

        let outcome = pipeline
            .run(records, "digest".into(), &CancellationToken::new(), &PipelineHooks::new())
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 2);
        let obscure = outcome
            .items
            .iter()
            .find(|i| i.id == "unmatched:Obscure Thing")
            .unwrap();
        assert_eq!(obscure.watch_count, 2);
        assert!(obscure.external_id.is_none());
    }

    #[tokio::test]
    async fn test_dedup_invariant() {
        let (pipeline, _) = pipeline(3);
        let records: Vec<ViewingRecord> = (0..20)
            .map(|i| record(if i % 2 == 0 { "Show" } else { "Film" }, date(2024, 1, 1 + i)))
            .collect();
        let total = records.len();

        let outcome = pipeline
            .run(records, "digest".into(), &CancellationToken::new(), &PipelineHooks::new())
            .await
            .unwrap();

        assert!(outcome.items.len() <= total);
        let mut ids: Vec<&str> = outcome.items.iter().map(|i| i.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), outcome.items.len());

        let counts: u32 = outcome.items.iter().map(|i| i.watch_count).sum();
        assert_eq!(counts as usize, total);
    }

    #[tokio::test]
    async fn test_detail_fetched_once_per_batch() {
        let catalog = Arc::new(StubCatalog::new());
        let pipeline = Pipeline::new(
            catalog.clone(),
            Arc::new(MemoryStore::new()),
            fast_config(40),
        );
        let records: Vec<ViewingRecord> =
            (0..10).map(|i| record("Show", date(2024, 1, 1 + i))).collect();

        pipeline
            .run(records, "digest".into(), &CancellationToken::new(), &PipelineHooks::new())
            .await
            .unwrap();

        // Ten records of one series in one batch: one detail fetch
        assert_eq!(catalog.detail_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_callback_runs_per_batch() {
        let (pipeline, _) = pipeline(10);
        let records: Vec<ViewingRecord> =
            (0..25).map(|i| record("Show", date(2024, 1, 1 + i % 27))).collect();

        let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_hook = seen.clone();
        let hooks = PipelineHooks::new()
            .on_progress(move |done, total| seen_in_hook.lock().unwrap().push((done, total)));

        pipeline
            .run(records, "digest".into(), &CancellationToken::new(), &hooks)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(10, 25), (20, 25), (25, 25)]);
    }

    #[tokio::test]
    async fn test_cancellation_halts_without_completion_effects() {
        let (pipeline, snapshots) = pipeline(5);
        let records: Vec<ViewingRecord> =
            (0..20).map(|i| record("Show", date(2024, 1, 1 + i))).collect();

        let token = CancellationToken::new();
        token.cancel();

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_hook = fired.clone();
        let hooks =
            PipelineHooks::new().on_progress(move |_, _| {
                fired_in_hook.fetch_add(1, Ordering::SeqCst);
            });

        let outcome = pipeline
            .run(records, "digest".into(), &token, &hooks)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.items.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), RunState::Cancelled);

        // Checkpoint survives cancellation
        let checkpoint = snapshots.load_checkpoint().await.unwrap().unwrap();
        assert!(checkpoint.active);
        assert_eq!(checkpoint.processed_count, 0);
    }

    #[tokio::test]
    async fn test_mid_run_cancellation_keeps_checkpoint_current() {
        let (pipeline, snapshots) = pipeline(40);
        // 85 records, batch size 40: cancellation during batch 3 keeps
        // batches 1-2 plus whatever of batch 3 completed.
        let records: Vec<ViewingRecord> =
            (0..85).map(|i| record("Show", date(2024, 1, 1 + i % 28))).collect();

        let token = CancellationToken::new();
        let cancel_at_80 = token.clone();
        let hooks = PipelineHooks::new().on_progress(move |done, _| {
            if done >= 80 {
                cancel_at_80.cancel();
            }
        });

        let outcome = pipeline
            .run(records, "digest".into(), &token, &hooks)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.processed, 80);
        let tallied: u32 = outcome.items.iter().map(|i| i.watch_count).sum();
        assert_eq!(tallied, 80);

        let checkpoint = snapshots.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(checkpoint.processed_count, 80);
        assert_eq!(checkpoint.records.len(), 85);
    }

    #[tokio::test]
    async fn test_resume_equivalence() {
        // Uninterrupted baseline
        let (baseline, _) = pipeline(10);
        let records: Vec<ViewingRecord> = (0..35)
            .map(|i| {
                record(
                    match i % 3 {
                        0 => "Show",
                        1 => "Film",
                        _ => "Nothing Known",
                    },
                    date(2024, 1, 1 + i % 28),
                )
            })
            .collect();

        let uninterrupted = baseline
            .run(
                records.clone(),
                "digest".into(),
                &CancellationToken::new(),
                &PipelineHooks::new(),
            )
            .await
            .unwrap();

        // Cancel after the second batch, then resume from the checkpoint
        let (interrupted, snapshots) = pipeline(10);
        let token = CancellationToken::new();
        let cancel = token.clone();
        let hooks = PipelineHooks::new().on_progress(move |done, _| {
            if done >= 20 {
                cancel.cancel();
            }
        });
        let partial = interrupted
            .run(records.clone(), "digest".into(), &token, &hooks)
            .await
            .unwrap();
        assert!(partial.cancelled);

        let checkpoint = snapshots.load_checkpoint().await.unwrap().unwrap();
        let resumed = interrupted
            .resume(checkpoint, &CancellationToken::new(), &PipelineHooks::new())
            .await
            .unwrap();

        assert!(!resumed.cancelled);
        assert_eq!(resumed.processed, 35);

        let mut base: Vec<(String, u32, NaiveDate)> = uninterrupted
            .items
            .iter()
            .map(|i| (i.id.clone(), i.watch_count, i.last_watched_on))
            .collect();
        let mut res: Vec<(String, u32, NaiveDate)> = resumed
            .items
            .iter()
            .map(|i| (i.id.clone(), i.watch_count, i.last_watched_on))
            .collect();
        base.sort();
        res.sort();
        assert_eq!(base, res);

        // Resume completion clears the checkpoint
        assert!(snapshots.load_checkpoint().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slot_released_between_sequential_runs() {
        let (pipeline, _) = pipeline(40);
        let records: Vec<ViewingRecord> =
            (0..5).map(|i| record("Show", date(2024, 1, 1 + i))).collect();

        for _ in 0..2 {
            let outcome = pipeline
                .run(
                    records.clone(),
                    "digest".into(),
                    &CancellationToken::new(),
                    &PipelineHooks::new(),
                )
                .await;
            assert!(outcome.is_ok());
        }
    }

    #[tokio::test]
    async fn test_busy_rejected_while_running() {
        let catalog = Arc::new(StubCatalog::new());
        let snapshots = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(
            catalog,
            snapshots,
            PipelineConfig {
                batch_size: 1,
                batch_delay_ms: 200,
                checkpoint_every_batches: 10,
            },
        ));
        let records: Vec<ViewingRecord> =
            (0..5).map(|i| record("Show", date(2024, 1, 1 + i))).collect();

        let long_run = {
            let pipeline = pipeline.clone();
            let records = records.clone();
            tokio::spawn(async move {
                pipeline
                    .run(records, "digest".into(), &CancellationToken::new(), &PipelineHooks::new())
                    .await
            })
        };

        // Give the spawned run time to claim the slot
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = pipeline
            .run(records, "other".into(), &CancellationToken::new(), &PipelineHooks::new())
            .await;
        assert!(matches!(second, Err(Error::PipelineBusy)));

        long_run.await.unwrap().unwrap();
    }
}
