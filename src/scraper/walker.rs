//! Lazy, finite walk over a category's result pages

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ScrapeError;
use crate::models::{CategoryDescriptor, RawPage};
use crate::scraper::RateLimitedFetcher;
use crate::traits::PageCountProbe;

/// Yields pages `1..=last_page` in ascending order, one fetch per call to
/// [`PageWalker::next`]. The walk cannot be restarted; after an error it is
/// exhausted.
pub struct PageWalker {
    fetcher: RateLimitedFetcher,
    probe: Option<Arc<dyn PageCountProbe>>,
    category: CategoryDescriptor,
    last_page: Option<u32>,
    next_page: u32,
    prefetched: Option<RawPage>,
    exhausted: bool,
}

impl PageWalker {
    pub fn new(
        fetcher: RateLimitedFetcher,
        probe: Option<Arc<dyn PageCountProbe>>,
        category: CategoryDescriptor,
    ) -> Self {
        Self {
            fetcher,
            probe,
            category,
            last_page: None,
            next_page: 1,
            prefetched: None,
            exhausted: false,
        }
    }

    pub fn category(&self) -> &CategoryDescriptor {
        &self.category
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    /// Determine the page count once.
    ///
    /// A failing probe degrades to a single page. Without a probe the first
    /// page is fetched directly and kept for the first call to `next`.
    pub async fn discover(&mut self) -> Result<u32, ScrapeError> {
        if let Some(last_page) = self.last_page {
            return Ok(last_page);
        }

        let tag = self.category.search_tag.clone();
        let last_page = match &self.probe {
            Some(probe) => {
                let url = self.fetcher.site().build_page_url(&tag, 1);
                match probe.last_page(&url).await {
                    Ok(n) => n.max(1),
                    Err(e) => {
                        warn!("{}; assuming a single page for {}", e, self.category.display_name);
                        1
                    }
                }
            }
            None => {
                let first = match self.fetcher.fetch_page(&tag, 1).await {
                    Ok(page) => page,
                    Err(e) => {
                        self.exhausted = true;
                        return Err(e);
                    }
                };
                let last_page = self.fetcher.site().highest_page(&first.body).unwrap_or(1);
                self.prefetched = Some(first);
                last_page
            }
        };

        info!("Found {} page(s) for {}", last_page, self.category.display_name);
        self.last_page = Some(last_page);
        Ok(last_page)
    }

    pub async fn next(&mut self) -> Option<Result<RawPage, ScrapeError>> {
        if self.exhausted {
            return None;
        }

        let last_page = match self.discover().await {
            Ok(n) => n,
            Err(e) => return Some(Err(e)),
        };
        if self.next_page > last_page {
            self.exhausted = true;
            return None;
        }

        let page = match self.prefetched.take() {
            Some(page) => page,
            None => {
                let tag = self.category.search_tag.clone();
                match self.fetcher.fetch_page(&tag, self.next_page).await {
                    Ok(page) => page,
                    Err(e) => {
                        self.exhausted = true;
                        return Some(Err(e));
                    }
                }
            }
        };

        self.next_page += 1;
        Some(Ok(page))
    }
}
