//! Catalog service integration
//!
//! This module provides:
//! - A trait for catalog lookup backends
//! - The HTTP implementation against the external metadata service
//! - The named match-selection and ongoing-status policies
//!
//! Lookup failures never escape this layer: `search` degrades to an empty
//! candidate list and `series_detail` to `None`, both logged, so one bad
//! lookup cannot abort a batch.

mod http;
mod rate_limit;

pub use http::*;
pub use rate_limit::*;

use crate::store::MediaKind;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One ranked search candidate from the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogMatch {
    pub external_id: i64,
    pub kind: MediaKind,
    pub display_title: String,
    pub poster_ref: Option<String>,
    pub backdrop_ref: Option<String>,
    pub synopsis: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub first_aired: Option<NaiveDate>,
    pub last_aired: Option<NaiveDate>,
    pub lifecycle_status: Option<String>,
    pub rating_average: Option<f32>,
}

/// Lifecycle detail for a series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDetail {
    pub lifecycle_status: Option<String>,
    pub in_production: bool,
    pub last_aired: Option<NaiveDate>,
}

/// Trait for catalog lookup backends
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Search the catalog; ranked candidates, empty on no match or failure
    async fn search(&self, query: &str) -> Vec<CatalogMatch>;

    /// Fetch series lifecycle detail; `None` on failure
    async fn series_detail(&self, external_id: i64) -> Option<SeriesDetail>;
}

/// Tie-break policy: the first ranked candidate wins
///
/// The catalog's own ranking is trusted as-is; there is no re-ranking and
/// no user disambiguation step.
pub fn select_match(candidates: &[CatalogMatch]) -> Option<&CatalogMatch> {
    candidates.first()
}

/// Lifecycle statuses that count as ongoing
const ONGOING_STATUSES: &[&str] = &["returning series", "in production"];

/// Whether a series counts as ongoing
///
/// True iff the detail's lifecycle status is on the fixed allow-list or the
/// service flags it as in production. Absent detail is not ongoing.
pub fn is_ongoing(detail: Option<&SeriesDetail>) -> bool {
    let Some(detail) = detail else {
        return false;
    };
    if detail.in_production {
        return true;
    }
    detail
        .lifecycle_status
        .as_deref()
        .map(|s| ONGOING_STATUSES.contains(&s.trim().to_lowercase().as_str()))
        .unwrap_or(false)
}
