//! Default values for configuration

/// Default catalog service base URL
pub fn default_catalog_base_url() -> String {
    std::env::var("REWATCH_CATALOG_URL")
        .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string())
}

/// Default environment variable name for the catalog API credential
pub fn default_catalog_api_key_env() -> String {
    "REWATCH_CATALOG_TOKEN".to_string()
}

/// Default request timeout in seconds
pub fn default_catalog_timeout() -> u64 {
    10
}

/// Default catalog request rate (requests per second)
pub fn default_catalog_rate_limit() -> u32 {
    20
}

/// Default user agent
pub fn default_catalog_user_agent() -> String {
    format!(
        "rewatch/{} (Viewing History Enricher)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Default records per batch
pub fn default_batch_size() -> usize {
    40
}

/// Default delay between batches in milliseconds
pub fn default_batch_delay_ms() -> u64 {
    500
}

/// Default checkpoint interval (batch boundaries between checkpoint writes)
pub fn default_checkpoint_every_batches() -> usize {
    10
}

/// Default header name of the title column
pub fn default_title_column() -> String {
    "Title".to_string()
}

/// Default header name of the watch-date column
pub fn default_date_column() -> String {
    "Date".to_string()
}

/// Default number of entries in the top-watched ranking
pub fn default_top_count() -> usize {
    10
}
