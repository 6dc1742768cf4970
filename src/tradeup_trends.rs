use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregator::ListingAggregator;
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::models::{CategoryDescriptor, Listing, ScrapeEvent, TradeUpContract};
use crate::scraper::{HttpPageSource, Pacing, PageWalker, RateLimitedFetcher, TokioSleeper, WebDriverProbe};
use crate::scrapers::SteamMarket;
use crate::store::ListingStore;
use crate::traits::{MarketSite, PageCountProbe, PageSource, Sleeper};
use crate::tradeup::TradeUpSearch;

const WATCH_REPORTED_CONTRACTS: usize = 3;

/// Ties the catalog, scraper, store and trade-up search together
#[derive(Clone)]
pub struct TradeUpTrends {
    config: Arc<AppConfig>,
    catalog: Arc<Catalog>,
    site: Arc<dyn MarketSite>,
    source: Arc<dyn PageSource>,
    sleeper: Arc<dyn Sleeper>,
    store: ListingStore,
    search: Arc<TradeUpSearch>,
    scrape_lock: Arc<Mutex<()>>,
}

impl TradeUpTrends {
    pub fn new(config: AppConfig) -> Result<Self> {
        let scraping = &config.scraping;
        let source = HttpPageSource::new(scraping.request_timeout(), &scraping.proxies)
            .context("Failed to build HTTP client")?;
        Self::with_source(config, Arc::new(source), Arc::new(TokioSleeper))
    }

    pub fn with_source(config: AppConfig, source: Arc<dyn PageSource>, sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        let site: Arc<dyn MarketSite> = Arc::new(SteamMarket::new(&config.scraping)?);
        let catalog = Catalog::with_overrides(&config.categories);
        let store = ListingStore::new(config.scraping.output_path.clone());
        let search = TradeUpSearch::from_config(&config.analysis);

        info!(
            "Loaded {} categories; listings stored in {}",
            catalog.len(),
            store.path().display()
        );

        Ok(Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            site,
            source,
            sleeper,
            store,
            search: Arc::new(search),
            scrape_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Configured `(min_price, max_price)` window
    pub fn price_window(&self) -> (Decimal, Decimal) {
        let analysis = &self.config.analysis;
        (analysis.min_price, analysis.max_price)
    }

    pub fn category(&self, key: &str) -> Result<&CategoryDescriptor> {
        self.catalog
            .get(key)
            .ok_or_else(|| anyhow!("Unknown category '{}' (see the `categories` command)", key))
    }

    /// A fresh page walker for one scrape session of a category.
    pub fn walker(&self, key: &str) -> Result<PageWalker> {
        let category = self.category(key)?.clone();
        let scraping = &self.config.scraping;

        let fetcher = RateLimitedFetcher::new(
            self.source.clone(),
            self.site.clone(),
            self.sleeper.clone(),
            Pacing::from_config(scraping),
            scraping.user_agents.clone(),
        );
        let probe = scraping.webdriver_url.as_ref().map(|url| {
            Arc::new(WebDriverProbe::new(url.clone(), scraping.probe_timeout(), self.site.clone()))
                as Arc<dyn PageCountProbe>
        });

        Ok(PageWalker::new(fetcher, probe, category))
    }

    /// Scrape a category and replace its stored listings.
    ///
    /// A scrape that stops early fails with a [`crate::error::PartialScrape`]
    /// inside the returned error; what it collected is already on disk.
    pub async fn scrape(
        &self,
        key: &str,
        events: Option<UnboundedSender<ScrapeEvent>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Listing>> {
        let guard = self.scrape_lock.lock().await;
        self.scrape_locked(key, events, cancel, guard).await
    }

    /// Scrape while holding the scrape lock; the guard is released when the
    /// scrape ends.
    async fn scrape_locked(
        &self,
        key: &str,
        events: Option<UnboundedSender<ScrapeEvent>>,
        cancel: &CancellationToken,
        _guard: MutexGuard<'_, ()>,
    ) -> Result<Vec<Listing>> {
        let mut walker = self.walker(key)?;
        let mut aggregator = ListingAggregator::new(Some(self.store.clone()), self.config.scraping.save_progress);
        if let Some(events) = events {
            aggregator = aggregator.with_events(events);
        }

        let listings = aggregator.scrape_category(key, &mut walker, cancel).await?;
        Ok(listings)
    }

    pub async fn stored_listings(&self, key: &str) -> Result<Option<Vec<Listing>>> {
        self.category(key)?;
        self.store.load_category(key).await
    }

    /// Stored listings of a category, scraping first when asked to or when
    /// nothing is stored yet.
    pub async fn listings(&self, key: &str, refresh: bool, cancel: &CancellationToken) -> Result<Vec<Listing>> {
        if !refresh {
            if let Some(listings) = self.stored_listings(key).await? {
                info!("Using {} stored {} listing(s)", listings.len(), key);
                return Ok(listings);
            }
            info!("No stored listings for {}, scraping", key);
        }
        self.scrape(key, None, cancel).await
    }

    /// Rank trade-up contracts on the blocking pool.
    pub async fn find_trade_ups(&self, listings: Vec<Listing>) -> Result<Vec<TradeUpContract>> {
        let search = self.search.clone();
        let contracts = tokio::task::spawn_blocking(move || search.find_opportunities(&listings))
            .await
            .context("Trade-up search task failed")?;
        Ok(contracts)
    }

    /// One scheduled run: re-scrape, re-rank and log the best contracts.
    /// Skipped while another scrape is still running.
    pub async fn check_category(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        let Ok(guard) = self.scrape_lock.try_lock() else {
            warn!("Previous scrape of {} still running, skipping this run", key);
            return Ok(());
        };

        let listings = self.scrape_locked(key, None, cancel, guard).await?;
        let contracts = self.find_trade_ups(listings).await?;

        if contracts.is_empty() {
            info!("No profitable trade-ups for {}", key);
        }
        for contract in contracts.iter().take(WATCH_REPORTED_CONTRACTS) {
            info!(
                "Trade-up for {}: cost {} -> EV {} ({}% margin, {}, {:.0}% success)",
                key,
                contract.cost,
                contract.expected_value,
                contract.profit_margin,
                contract.risk_level,
                contract.success_chance * 100.0
            );
        }
        Ok(())
    }
}
