//! Accumulates normalized listings across the pages of one category scrape

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{PartialScrape, ScrapeError};
use crate::models::{Listing, ScrapeEvent, ScrapeProgress};
use crate::normalizer;
use crate::scraper::PageWalker;
use crate::store::ListingStore;

const PROGRESS_EVERY_ITEMS: usize = 10;
const RECENT_LISTINGS: usize = 3;

pub struct ListingAggregator {
    store: Option<ListingStore>,
    persist_every_page: bool,
    events: Option<UnboundedSender<ScrapeEvent>>,
}

impl ListingAggregator {
    pub fn new(store: Option<ListingStore>, persist_every_page: bool) -> Self {
        Self {
            store,
            persist_every_page,
            events: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<ScrapeEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Walk every page of a category and collect its listings.
    ///
    /// # Errors
    /// A `PartialScrape` carrying the listings gathered so far when a page
    /// cannot be fetched or the token is cancelled.
    pub async fn scrape_category(
        &self,
        key: &str,
        walker: &mut PageWalker,
        cancel: &CancellationToken,
    ) -> Result<Vec<Listing>, PartialScrape> {
        let mut session = Session::new(key);

        if cancel.is_cancelled() {
            return Err(self.abort(session, ScrapeError::Cancelled).await);
        }

        let total_pages = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.abort(session, ScrapeError::Cancelled).await),
            discovered = walker.discover() => match discovered {
                Ok(n) => n,
                Err(e) => return Err(self.abort(session, e).await),
            },
        };
        session.total_pages = total_pages;
        info!("Scraping {} ({} page(s))", walker.category().display_name, total_pages);
        self.emit(ScrapeEvent::Started {
            category: key.to_string(),
            total_pages,
        });

        loop {
            if cancel.is_cancelled() {
                return Err(self.abort(session, ScrapeError::Cancelled).await);
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.abort(session, ScrapeError::Cancelled).await),
                next = walker.next() => next,
            };
            let page = match next {
                None => break,
                Some(Ok(page)) => page,
                Some(Err(e)) => return Err(self.abort(session, e).await),
            };

            let raw_listings = walker.fetcher().site().extract_listings(&page.body);
            if raw_listings.is_empty() {
                warn!("No listings found on page {} of {}", page.page, key);
            }

            let scraped_at = Utc::now();
            for (processed, raw) in raw_listings.iter().enumerate() {
                session.next_item_index += 1;
                let item_index = session.next_item_index;

                match normalizer::normalize_raw(raw) {
                    Ok(normalized) => {
                        session
                            .listings
                            .push(normalized.into_listing(page.page, item_index, scraped_at));
                    }
                    Err(e) => warn!("Skipping listing on page {}: {}", page.page, e),
                }

                if (processed + 1) % PROGRESS_EVERY_ITEMS == 0 {
                    self.emit(session.progress());
                }
            }

            session.pages_done += 1;
            if self.persist_every_page {
                self.persist(&session).await;
            }
            self.emit(session.progress());
            info!(
                "Page {}/{} of {}: {} listing(s) so far",
                page.page,
                total_pages,
                key,
                session.listings.len()
            );
        }

        if !self.persist_every_page {
            self.persist(&session).await;
        }
        self.emit(ScrapeEvent::Finished {
            category: key.to_string(),
            items: session.listings.len(),
        });
        info!("Finished {}: {} listing(s)", key, session.listings.len());
        Ok(session.listings)
    }

    async fn abort(&self, session: Session, source: ScrapeError) -> PartialScrape {
        if !self.persist_every_page && !session.listings.is_empty() {
            self.persist(&session).await;
        }
        error!("Scrape of {} aborted: {}", session.category, source);
        self.emit(ScrapeEvent::Aborted {
            category: session.category.clone(),
            items: session.listings.len(),
            reason: source.to_string(),
        });

        PartialScrape {
            category: session.category,
            pages_done: session.pages_done,
            listings: session.listings,
            source,
        }
    }

    /// A failed save is logged and the scrape carries on.
    async fn persist(&self, session: &Session) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_category(&session.category, &session.listings).await {
                error!("Failed to save {} listings: {:#}", session.category, e);
            }
        }
    }

    fn emit(&self, event: ScrapeEvent) {
        if let Some(events) = &self.events {
            // a dropped receiver only means nobody is watching
            let _ = events.send(event);
        }
    }
}

struct Session {
    category: String,
    total_pages: u32,
    pages_done: u32,
    next_item_index: u32,
    listings: Vec<Listing>,
}

impl Session {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            total_pages: 0,
            pages_done: 0,
            next_item_index: 0,
            listings: Vec::new(),
        }
    }

    fn progress(&self) -> ScrapeEvent {
        let recent_start = self.listings.len().saturating_sub(RECENT_LISTINGS);
        ScrapeEvent::Progress(ScrapeProgress {
            category: self.category.clone(),
            pages_done: self.pages_done,
            total_pages: self.total_pages,
            items_so_far: self.listings.len(),
            recent_listings: self.listings[recent_start..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tokio::sync::mpsc;

    use crate::models::CategoryDescriptor;
    use crate::scraper::RateLimitedFetcher;
    use crate::scraper::fetcher::tests::{RecordingSleeper, ScriptedSource, pacing, steam_site};
    use crate::scrapers::steam::fixture_page;
    use crate::traits::{PageResponse, PageSource};

    /// Cancels the token once the given number of requests went through
    struct CancellingSource {
        inner: ScriptedSource,
        cancel_after: usize,
        token: CancellationToken,
    }

    #[async_trait]
    impl PageSource for CancellingSource {
        async fn fetch(&self, url: &str, user_agent: &str) -> Result<PageResponse, ScrapeError> {
            let response = self.inner.fetch(url, user_agent).await;
            if self.inner.urls().len() >= self.cancel_after {
                self.token.cancel();
            }
            response
        }
    }

    fn page(last_page: u32, names: &[&str]) -> (u16, String) {
        let items: Vec<(&str, &str)> = names.iter().map(|n| (*n, "$2.00 USD")).collect();
        (200, fixture_page(&items, last_page))
    }

    fn walker(source: Arc<dyn PageSource>) -> PageWalker {
        let fetcher = RateLimitedFetcher::new(
            source,
            steam_site(),
            Arc::new(RecordingSleeper::default()),
            pacing(0, 0.0),
            Vec::new(),
        )
        .with_rng(StdRng::seed_from_u64(3));
        let category = CategoryDescriptor {
            display_name: "AK-47".to_string(),
            search_tag: "ak47".to_string(),
        };
        PageWalker::new(fetcher, None, category)
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_pages_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListingStore::new(dir.path().join("items.json"));
        let source = Arc::new(ScriptedSource::new([
            page(5, &["AK-47 | Slate (Field-Tested)", "AK-47 | Elite Build (Well-Worn)"]),
            page(5, &["AK-47 | Uncharted (Minimal Wear)"]),
            (503, String::new()),
        ]));
        let aggregator = ListingAggregator::new(Some(store.clone()), true);

        let err = aggregator
            .scrape_category("ak47", &mut walker(source.clone()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.source, ScrapeError::FetchFailed { status: 503, .. }));
        assert_eq!(err.pages_done, 2);
        assert_eq!(err.listings.len(), 3);
        assert_eq!(source.urls().len(), 3);

        let saved = store.load_category("ak47").await.unwrap().unwrap();
        assert_eq!(saved, err.listings);
        assert_eq!(saved[2].page_index, 2);
    }

    #[tokio::test]
    async fn test_partial_scrape_persisted_over_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, "{ \"ak47\": [").unwrap();
        let store = ListingStore::new(&path);
        let source = Arc::new(ScriptedSource::new([
            page(5, &["AK-47 | Slate (Field-Tested)"]),
            (503, String::new()),
        ]));

        let err = ListingAggregator::new(Some(store.clone()), true)
            .scrape_category("ak47", &mut walker(source), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.listings.len(), 1);
        assert_eq!(store.load_category("ak47").await.unwrap(), Some(err.listings));
        assert!(dir.path().join("items.json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_full_scrape_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListingStore::new(dir.path().join("items.json"));
        let names: Vec<String> = (0..12).map(|i| format!("AK-47 | Skin {i} (Factory New)")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let source = Arc::new(ScriptedSource::new([page(2, &names), page(2, &["AK-47 | Slate (Field-Tested)"])]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let aggregator = ListingAggregator::new(Some(store.clone()), false).with_events(tx);

        let listings = aggregator
            .scrape_category("ak47", &mut walker(source), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(listings.len(), 13);
        assert_eq!((listings[0].page_index, listings[0].item_index), (1, 1));
        assert_eq!(listings[11].item_index, 12);
        assert_eq!((listings[12].page_index, listings[12].item_index), (2, 13));
        assert_eq!(store.load_category("ak47").await.unwrap().unwrap().len(), 13);

        drop(aggregator);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events[0], ScrapeEvent::Started { total_pages: 2, .. }));
        // one mid-page update after ten items, then one per page
        let progress: Vec<&ScrapeProgress> = events
            .iter()
            .filter_map(|e| match e {
                ScrapeEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[0].items_so_far, 10);
        assert_eq!(progress[2].pages_done, 2);
        assert_eq!(progress[2].recent_listings.len(), 3);
        assert_eq!(progress[2].recent_listings[2].name, "AK-47 | Slate");
        assert!(matches!(events.last(), Some(ScrapeEvent::Finished { items: 13, .. })));
    }

    #[tokio::test]
    async fn test_malformed_listing_skipped() {
        let html = fixture_page(
            &[("AK-47 | Slate (Field-Tested)", "Sold out"), ("AK-47 | Redline (Field-Tested)", "$9.99")],
            1,
        );
        let source = Arc::new(ScriptedSource::new([(200, html)]));
        let aggregator = ListingAggregator::new(None, true);

        let listings = aggregator
            .scrape_category("ak47", &mut walker(source), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].name, "AK-47 | Redline");
        assert_eq!(listings[0].item_index, 2);
    }

    #[tokio::test]
    async fn test_cancelled_between_pages() {
        let token = CancellationToken::new();
        let source = Arc::new(CancellingSource {
            inner: ScriptedSource::new([page(4, &["AK-47 | Slate (Field-Tested)"]), page(4, &["AK-47 | Safari Mesh"])]),
            cancel_after: 2,
            token: token.clone(),
        });
        let aggregator = ListingAggregator::new(None, true);

        let err = aggregator
            .scrape_category("ak47", &mut walker(source.clone()), &token)
            .await
            .unwrap_err();
        assert!(matches!(err.source, ScrapeError::Cancelled));
        assert_eq!(err.pages_done, 2);
        assert_eq!(err.listings.len(), 2);
        assert_eq!(source.inner.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let source = Arc::new(ScriptedSource::default());

        let err = ListingAggregator::new(None, true)
            .scrape_category("ak47", &mut walker(source.clone()), &token)
            .await
            .unwrap_err();
        assert!(matches!(err.source, ScrapeError::Cancelled));
        assert!(err.listings.is_empty());
        assert!(source.urls().is_empty());
    }
}
