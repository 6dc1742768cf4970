use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use tracing::debug;

use crate::error::ScrapeError;
use crate::traits::{PageResponse, PageSource, Sleeper};

pub mod fetcher;
pub mod probe;
pub mod walker;

pub use fetcher::{Pacing, RateLimitedFetcher};
pub use probe::WebDriverProbe;
pub use walker::PageWalker;

/// reqwest-backed page source, rotating through one client per proxy
pub struct HttpPageSource {
    clients: Vec<Client>,
    next_client: AtomicUsize,
}

impl HttpPageSource {
    pub fn new(timeout: Duration, proxies: &[String]) -> Result<Self> {
        let builder = || Client::builder().timeout(timeout);

        let clients = if proxies.is_empty() {
            vec![builder().build()?]
        } else {
            proxies
                .iter()
                .map(|proxy| -> Result<Client> { Ok(builder().proxy(reqwest::Proxy::all(proxy)?).build()?) })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            clients,
            next_client: AtomicUsize::new(0),
        })
    }

    fn client(&self) -> &Client {
        let index = self.next_client.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[index]
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<PageResponse, ScrapeError> {
        let response = self.client().get(url).header(USER_AGENT, user_agent).send().await?;
        let status = response.status();
        debug!("GET {} -> {}", url, status);

        let body = if status.is_success() {
            response.text().await?
        } else {
            String::new()
        };

        Ok(PageResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Real-time sleeper
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
