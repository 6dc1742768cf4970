//! Steam Community Market specific scraper implementation

use anyhow::Result;
use scraper::{Html, Selector};

use crate::config::ScrapingConfig;
use crate::models::RawListing;
use crate::traits::{MarketSite, SiteConfig, SiteSelectors};

/// Selectors and URL layout of the Steam Community Market search page
pub struct SteamMarket {
    config: SiteConfig,
    name_selector: Selector,
    price_selector: Selector,
    pagination_selector: Selector,
}

impl SteamMarket {
    /// Create a Steam market site from the scraping configuration
    pub fn new(scraping: &ScrapingConfig) -> Result<Self> {
        let config = SiteConfig {
            name: "Steam Community Market".to_string(),
            search_url_pattern: scraping.search_url_pattern.clone(),
            page_suffix_pattern: scraping.page_suffix_pattern.clone(),
            selectors: SiteSelectors {
                listing_name: "span.market_listing_item_name".to_string(),
                // the outer normal_price span wraps a "Starting at:" label
                listing_price: "span.normal_price[data-price]".to_string(),
                pagination_link: "span.market_paging_pagelink".to_string(),
            },
        };
        Self::with_config(config)
    }

    pub fn with_config(config: SiteConfig) -> Result<Self> {
        let name_selector = Selector::parse(&config.selectors.listing_name)
            .map_err(|e| anyhow::anyhow!("Failed to parse listing name selector: {:?}", e))?;
        let price_selector = Selector::parse(&config.selectors.listing_price)
            .map_err(|e| anyhow::anyhow!("Failed to parse listing price selector: {:?}", e))?;
        let pagination_selector = Selector::parse(&config.selectors.pagination_link)
            .map_err(|e| anyhow::anyhow!("Failed to parse pagination selector: {:?}", e))?;

        Ok(Self {
            config,
            name_selector,
            price_selector,
            pagination_selector,
        })
    }
}

impl MarketSite for SteamMarket {
    fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn extract_listings(&self, body: &str) -> Vec<RawListing> {
        let document = Html::parse_document(body);

        let names = document
            .select(&self.name_selector)
            .map(|el| el.text().collect::<String>().trim().to_string());
        let prices = document
            .select(&self.price_selector)
            .map(|el| el.text().collect::<String>());

        names
            .zip(prices)
            .map(|(raw_name, raw_price_text)| RawListing {
                raw_name,
                raw_price_text,
            })
            .collect()
    }

    fn highest_page(&self, body: &str) -> Option<u32> {
        let document = Html::parse_document(body);
        document
            .select(&self.pagination_selector)
            .filter_map(|el| el.text().collect::<String>().trim().parse::<u32>().ok())
            .max()
    }
}

/// Builds a search-results page in the Steam markup, for tests
#[cfg(test)]
pub(crate) fn fixture_page(items: &[(&str, &str)], last_page: u32) -> String {
    let rows: String = items
        .iter()
        .map(|(name, price)| {
            format!(
                r#"<a class="market_listing_row_link"><div class="market_listing_row">
                <span class="normal_price">Starting at:<br/><span class="normal_price" data-price="1">{price}</span></span>
                <span class="market_listing_item_name">{name}</span></div></a>"#
            )
        })
        .collect();
    let paging: String = (1..=last_page)
        .map(|n| format!(r#"<span class="market_paging_pagelink">{n}</span>"#))
        .collect();
    format!(
        r#"<html><body><div id="searchResultsRows">{rows}</div><span id="searchResults_links">{paging}</span></body></html>"#
    )
}
