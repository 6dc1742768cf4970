//! Page-count discovery through a WebDriver browser session

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::wd::Capabilities;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::traits::{MarketSite, PageCountProbe};

/// Loads the first results page in a headless browser and reads the
/// pagination control once it has rendered.
pub struct WebDriverProbe {
    webdriver_url: String,
    timeout: Duration,
    site: Arc<dyn MarketSite>,
}

impl WebDriverProbe {
    pub fn new(webdriver_url: impl Into<String>, timeout: Duration, site: Arc<dyn MarketSite>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            timeout,
            site,
        }
    }

    fn headless_capabilities() -> Capabilities {
        let mut caps = Capabilities::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": ["--headless", "--disable-gpu", "--no-sandbox"] }),
        );
        caps.insert("moz:firefoxOptions".to_string(), json!({ "args": ["-headless"] }));
        caps
    }

    async fn read_last_page(&self, client: &Client, url: &str) -> Result<u32, ScrapeError> {
        client
            .goto(url)
            .await
            .map_err(|e| ScrapeError::PaginationProbeFailed(format!("navigation failed: {}", e)))?;

        let selector = &self.site.config().selectors.pagination_link;
        client
            .wait()
            .at_most(self.timeout)
            .for_element(Locator::Css(selector))
            .await
            .map_err(|e| ScrapeError::PaginationProbeFailed(format!("pagination never rendered: {}", e)))?;

        let source = client
            .source()
            .await
            .map_err(|e| ScrapeError::PaginationProbeFailed(format!("could not read page source: {}", e)))?;

        Ok(self.site.highest_page(&source).unwrap_or(1))
    }
}

#[async_trait]
impl PageCountProbe for WebDriverProbe {
    async fn last_page(&self, first_page_url: &str) -> Result<u32, ScrapeError> {
        info!("Connecting to webdriver at {}", self.webdriver_url);
        let mut builder = ClientBuilder::native();
        builder.capabilities(Self::headless_capabilities());
        let client = builder
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| ScrapeError::PaginationProbeFailed(format!("webdriver unavailable: {}", e)))?;

        let result = self.read_last_page(&client, first_page_url).await;
        debug!("Probe of {} returned {:?}", first_page_url, result);

        // the session is released whether or not the probe succeeded
        if let Err(e) = client.close().await {
            warn!("Failed to close webdriver session: {}", e);
        }
        result
    }
}
