//! Data models for scraped listings, trade-up contracts and progress events

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A listing as it appears on the page, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub raw_name: String,
    pub raw_price_text: String,
}

/// One rendered search-results page
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub page: u32,
    pub body: String,
}

/// A normalized marketplace listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub name: String,
    pub price_text: String,
    pub price_amount: Decimal,
    pub is_stat_trak: bool,
    pub is_souvenir: bool,
    pub wear: Option<String>,
    pub page_index: u32,
    pub item_index: u32,
    pub scraped_at: DateTime<Utc>,
}

/// Display name and search tag for one item category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    pub display_name: String,
    pub search_tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
        };
        f.write_str(label)
    }
}

/// A scored trade-up contract
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeUpContract {
    pub inputs: Vec<Listing>,
    pub potential_outputs: Vec<Listing>,
    pub cost: Decimal,
    pub expected_value: Decimal,
    pub profit_margin: Decimal,
    pub risk_level: RiskLevel,
    pub float_range: (f64, f64),
    pub success_chance: f64,
}

/// Condensed view of a contract for display or JSON export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSummary {
    pub input_cost: Decimal,
    pub expected_value: Decimal,
    pub profit_margin: Decimal,
    pub risk_level: RiskLevel,
    pub success_chance: f64,
    pub float_range: (f64, f64),
    pub input_items: Vec<ItemSummary>,
    pub potential_outputs: Vec<ItemSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    pub name: String,
    pub wear: Option<String>,
    pub price: String,
}

impl From<&Listing> for ItemSummary {
    fn from(listing: &Listing) -> Self {
        Self {
            name: listing.name.clone(),
            wear: listing.wear.clone(),
            price: listing.price_text.clone(),
        }
    }
}

impl TradeUpContract {
    pub fn summary(&self) -> ContractSummary {
        ContractSummary {
            input_cost: self.cost,
            expected_value: self.expected_value,
            profit_margin: self.profit_margin,
            risk_level: self.risk_level,
            success_chance: self.success_chance,
            float_range: self.float_range,
            input_items: self.inputs.iter().map(ItemSummary::from).collect(),
            potential_outputs: self.potential_outputs.iter().map(ItemSummary::from).collect(),
        }
    }
}

/// Progress snapshot sent to the front end while a category is scraped
#[derive(Debug, Clone)]
pub struct ScrapeProgress {
    pub category: String,
    pub pages_done: u32,
    pub total_pages: u32,
    pub items_so_far: usize,
    pub recent_listings: Vec<Listing>,
}

/// Events emitted by the aggregator over its progress channel
#[derive(Debug, Clone)]
pub enum ScrapeEvent {
    Started { category: String, total_pages: u32 },
    Progress(ScrapeProgress),
    Finished { category: String, items: usize },
    Aborted { category: String, items: usize, reason: String },
}
