//! HTTP catalog backend
//!
//! Talks to a TMDB-style REST service: one multi-type title search and one
//! series detail fetch. Maps wire DTOs to internal types; never mutates
//! domain state. Every request is paced and carries a bounded timeout.

use super::{CatalogClient, CatalogMatch, RequestPacer, SeriesDetail};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::store::MediaKind;
use chrono::NaiveDate;
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Multi-search response wrapper
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// One raw search hit; non-title hits carry a foreign `media_type`
#[derive(Debug, Deserialize)]
struct SearchHit {
    id: i64,
    #[serde(default)]
    media_type: String,
    title: Option<String>,
    name: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f32>,
}

/// Series detail response
#[derive(Debug, Deserialize)]
struct SeriesDetailResponse {
    status: Option<String>,
    #[serde(default)]
    in_production: bool,
    last_air_date: Option<String>,
}

/// HTTP client for the catalog service
pub struct HttpCatalog {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    pacer: RequestPacer,
}

impl HttpCatalog {
    /// Create a new catalog client
    ///
    /// The credential is injected by the caller (resolved from the env var
    /// the config names); it is never baked into the binary.
    pub fn new(config: &CatalogConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| Error::Lookup(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url)?;

        Ok(Self {
            client,
            base_url,
            api_key,
            pacer: RequestPacer::new(config.rate_limit_per_sec),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Lookup("catalog base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T> {
        self.pacer.wait().await;

        let mut request = self.client.get(url.clone()).header(header::ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Lookup(format!("HTTP {}: {}", status, url)));
        }

        Ok(response.json::<T>().await?)
    }

    async fn try_search(&self, query: &str) -> Result<Vec<CatalogMatch>> {
        let mut url = self.endpoint(&["search", "multi"])?;
        url.query_pairs_mut().append_pair("query", query);

        debug!("Catalog search: {}", query);
        let response: SearchResponse = self.get_json(url).await?;

        Ok(response
            .results
            .into_iter()
            .filter_map(map_search_hit)
            .collect())
    }

    async fn try_series_detail(&self, external_id: i64) -> Result<SeriesDetail> {
        let url = self.endpoint(&["tv", &external_id.to_string()])?;

        debug!("Catalog series detail: {}", external_id);
        let response: SeriesDetailResponse = self.get_json(url).await?;

        Ok(SeriesDetail {
            lifecycle_status: response.status,
            in_production: response.in_production,
            last_aired: response.last_air_date.as_deref().and_then(parse_wire_date),
        })
    }
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalog {
    async fn search(&self, query: &str) -> Vec<CatalogMatch> {
        match self.try_search(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Catalog search failed for '{}': {}", query, e);
                Vec::new()
            }
        }
    }

    async fn series_detail(&self, external_id: i64) -> Option<SeriesDetail> {
        match self.try_series_detail(external_id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!("Series detail fetch failed for {}: {}", external_id, e);
                None
            }
        }
    }
}

/// Map a raw hit to a candidate, skipping non-title media types
fn map_search_hit(hit: SearchHit) -> Option<CatalogMatch> {
    let kind = match hit.media_type.as_str() {
        "movie" => MediaKind::Movie,
        "tv" => MediaKind::Series,
        _ => return None,
    };

    let display_title = hit
        .title
        .or(hit.name)
        .filter(|t| !t.trim().is_empty())?;

    Some(CatalogMatch {
        external_id: hit.id,
        kind,
        display_title,
        poster_ref: hit.poster_path,
        backdrop_ref: hit.backdrop_path,
        synopsis: hit.overview.filter(|s| !s.is_empty()),
        release_date: hit.release_date.as_deref().and_then(parse_wire_date),
        first_aired: hit.first_air_date.as_deref().and_then(parse_wire_date),
        last_aired: None,
        lifecycle_status: None,
        rating_average: hit.vote_average,
    })
}

fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
