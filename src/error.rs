//! Error taxonomy for scraping and configuration

use thiserror::Error;

use crate::models::Listing;

/// Failures raised while fetching, paging or normalizing marketplace data.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// One listing could not be normalized; the page carries on without it.
    #[error("malformed listing {name:?}: {reason}")]
    MalformedListing { name: String, reason: String },

    /// The marketplace kept answering 429 after every retry was spent.
    #[error("rate limited on {url} after {retries} retries")]
    RateLimitExceeded { url: String, retries: u32 },

    #[error("fetch of {url} failed with HTTP {status}")]
    FetchFailed { url: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Page-count discovery failed; callers fall back to a single page.
    #[error("pagination probe failed: {0}")]
    PaginationProbeFailed(String),

    #[error("scrape cancelled")]
    Cancelled,
}

/// A category scrape that stopped early. Everything collected before the
/// failure is kept in `listings` (and was already persisted).
#[derive(Debug, Error)]
#[error("scrape of {category} stopped after {pages_done} page(s) with {} listing(s): {source}", listings.len())]
pub struct PartialScrape {
    pub category: String,
    pub pages_done: u32,
    pub listings: Vec<Listing>,
    #[source]
    pub source: ScrapeError,
}

/// Startup configuration failures. Both are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
