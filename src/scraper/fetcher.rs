//! Rate-limited page fetching with exponential backoff

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::ScrapingConfig;
use crate::error::ScrapeError;
use crate::models::RawPage;
use crate::traits::{MarketSite, PageSource, Sleeper};

const HTTP_TOO_MANY_REQUESTS: u16 = 429;

const FALLBACK_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

/// Delay and retry knobs, in seconds
#[derive(Debug, Clone)]
pub struct Pacing {
    pub min_delay: f64,
    pub max_delay: f64,
    pub backoff_min: f64,
    pub backoff_max: f64,
    pub max_retries: u32,
}

impl Pacing {
    pub fn from_config(scraping: &ScrapingConfig) -> Self {
        Self {
            min_delay: scraping.min_delay,
            max_delay: scraping.max_delay,
            backoff_min: scraping.backoff_min,
            backoff_max: scraping.backoff_max,
            max_retries: scraping.max_retries,
        }
    }
}

/// Issues one page request at a time for a scrape session.
///
/// Every attempt after the first is preceded by a random pacing delay. A 429
/// answer is retried after `uniform(backoff_min, backoff_max) * 2^retry`
/// seconds until `max_retries` is spent.
pub struct RateLimitedFetcher {
    source: Arc<dyn PageSource>,
    site: Arc<dyn MarketSite>,
    sleeper: Arc<dyn Sleeper>,
    pacing: Pacing,
    user_agents: Vec<String>,
    rng: StdRng,
    attempts: u64,
}

impl RateLimitedFetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        site: Arc<dyn MarketSite>,
        sleeper: Arc<dyn Sleeper>,
        pacing: Pacing,
        user_agents: Vec<String>,
    ) -> Self {
        let user_agents = if user_agents.is_empty() {
            FALLBACK_USER_AGENTS.iter().map(|ua| (*ua).to_string()).collect()
        } else {
            user_agents
        };

        Self {
            source,
            site,
            sleeper,
            pacing,
            user_agents,
            rng: StdRng::from_os_rng(),
            attempts: 0,
        }
    }

    /// Replace the random source, for reproducible delays.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn site(&self) -> &Arc<dyn MarketSite> {
        &self.site
    }

    /// Fetch one results page of a category.
    ///
    /// # Errors
    /// `RateLimitExceeded` once the retry budget is spent, `FetchFailed` for
    /// any other non-2xx status and `Transport` for network failures.
    pub async fn fetch_page(&mut self, category_tag: &str, page: u32) -> Result<RawPage, ScrapeError> {
        let url = self.site.build_page_url(category_tag, page);
        let mut retries = 0;

        loop {
            self.pace().await;
            let user_agent = self.pick_user_agent();
            debug!("Fetching page {} (attempt {}): {}", page, retries + 1, url);

            let response = self.source.fetch(&url, &user_agent).await?;
            match response.status {
                HTTP_TOO_MANY_REQUESTS => {
                    if retries >= self.pacing.max_retries {
                        return Err(ScrapeError::RateLimitExceeded { url, retries });
                    }
                    let wait = self.backoff(retries);
                    warn!(
                        "Rate limited! Sleeping {:.1}s before retry {} of {}",
                        wait.as_secs_f64(),
                        retries + 1,
                        self.pacing.max_retries
                    );
                    self.sleeper.sleep(wait).await;
                    retries += 1;
                }
                status if (200..300).contains(&status) => {
                    return Ok(RawPage {
                        url,
                        page,
                        body: response.body,
                    });
                }
                status => return Err(ScrapeError::FetchFailed { url, status }),
            }
        }
    }

    async fn pace(&mut self) {
        if self.attempts > 0 {
            let delay = self.pacing_delay();
            if !delay.is_zero() {
                self.sleeper.sleep(delay).await;
            }
        }
        self.attempts += 1;
    }

    fn pacing_delay(&mut self) -> Duration {
        let Pacing { min_delay, max_delay, .. } = self.pacing;
        let seconds = if max_delay > min_delay {
            self.rng.random_range(min_delay..=max_delay)
        } else {
            min_delay
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }

    fn backoff(&mut self, retries: u32) -> Duration {
        let Pacing { backoff_min, backoff_max, .. } = self.pacing;
        let base = if backoff_max > backoff_min {
            self.rng.random_range(backoff_min..backoff_max)
        } else {
            backoff_min
        };
        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(base * 2f64.powi(exponent)).unwrap_or(Duration::MAX)
    }

    fn pick_user_agent(&mut self) -> String {
        let index = self.rng.random_range(0..self.user_agents.len());
        self.user_agents[index].clone()
    }
}
