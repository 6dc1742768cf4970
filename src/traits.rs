//! Traits and interfaces for marketplace-agnostic scraping

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::models::RawListing;

/// Configuration for a marketplace site
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Display name for the marketplace
    pub name: String,
    /// Search URL pattern with a {tag} placeholder
    pub search_url_pattern: String,
    /// Page suffix pattern with a {page} placeholder, sorted by ascending price
    pub page_suffix_pattern: String,
    /// CSS selectors for extracting data
    pub selectors: SiteSelectors,
}

/// CSS selectors for the parts of a search-results page
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Item name element, one per listing, in DOM order
    pub listing_name: String,
    /// Price element, paired positionally with `listing_name`
    pub listing_price: String,
    /// Numbered pagination links
    pub pagination_link: String,
}

/// Site-specific URL building and HTML extraction
pub trait MarketSite: Send + Sync {
    /// Get the configuration for this site
    fn config(&self) -> &SiteConfig;

    /// Ordered (name, price) pairs found on a rendered page.
    fn extract_listings(&self, body: &str) -> Vec<RawListing>;

    /// Highest page number shown by the pagination control, if any.
    fn highest_page(&self, body: &str) -> Option<u32>;

    /// Search URL for a category tag
    ///
    /// # Arguments
    /// * `search_tag` - The marketplace tag of the category
    fn build_search_url(&self, search_tag: &str) -> String {
        let encoded_tag = urlencoding::encode(search_tag);
        self.config().search_url_pattern.replace("{tag}", &encoded_tag)
    }

    /// Suffix selecting one page of price-ascending results
    fn page_add_on(&self, page: u32) -> String {
        self.config()
            .page_suffix_pattern
            .replace("{page}", &page.to_string())
    }

    fn build_page_url(&self, search_tag: &str, page: u32) -> String {
        format!("{}{}", self.build_search_url(search_tag), self.page_add_on(page))
    }
}

/// Status and body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// Network capability used by the fetcher
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Issue a GET with the given User-Agent.
    ///
    /// Non-2xx statuses are returned, not raised; only transport failures
    /// are errors.
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<PageResponse, ScrapeError>;
}

/// Suspension point for pacing and backoff, swapped for a fake clock in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// One-shot discovery of a category's page count
#[async_trait]
pub trait PageCountProbe: Send + Sync {
    async fn last_page(&self, first_page_url: &str) -> Result<u32, ScrapeError>;
}
