//! Plain-text and JSON rendering for the command-line front end

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::analysis::MarketSummary;
use crate::catalog::Catalog;
use crate::models::{ContractSummary, ScrapeEvent, TradeUpContract};

pub fn print_categories(catalog: &Catalog) {
    println!("{:<12} {:<20} TAG", "KEY", "NAME");
    for (key, category) in catalog.iter() {
        println!("{:<12} {:<20} {}", key, category.display_name, category.search_tag);
    }
}

pub fn print_market_summary(category: &str, summary: &MarketSummary, in_range: usize, window: (Decimal, Decimal)) {
    println!("Market summary for {}", category);
    println!("  Items:         {}", summary.total_items);
    println!("  In {} - {}:  {}", window.0, window.1, in_range);
    println!("  Average price: {}", summary.average_price);
    println!("  Price range:   {} - {}", summary.min_price, summary.max_price);
    println!("  StatTrak:      {}", summary.stat_trak_count);
    println!("  Souvenir:      {}", summary.souvenir_count);

    println!("Price distribution");
    for (bucket, count) in &summary.price_distribution {
        println!("  {:<12} {}", bucket, count);
    }

    println!("Wear distribution");
    for (wear, count) in &summary.wear_distribution {
        println!("  {:<16} {}", wear, count);
    }
}

pub fn print_contracts(contracts: &[TradeUpContract], top: usize) {
    if contracts.is_empty() {
        println!("No profitable trade-ups found");
        return;
    }

    println!("{} trade-up(s) found, showing {}", contracts.len(), top.min(contracts.len()));
    for (rank, contract) in contracts.iter().take(top).enumerate() {
        println!(
            "#{} cost {} -> EV {} | margin {}% | {} | success {:.0}% | float {:.3}-{:.3}",
            rank + 1,
            contract.cost.round_dp(2),
            contract.expected_value.round_dp(2),
            contract.profit_margin.round_dp(2),
            contract.risk_level,
            contract.success_chance * 100.0,
            contract.float_range.0,
            contract.float_range.1
        );
        for input in &contract.inputs {
            println!(
                "    in:  {} ({}) {}",
                input.name,
                input.wear.as_deref().unwrap_or("-"),
                input.price_text
            );
        }
        for output in &contract.potential_outputs {
            println!(
                "    out: {} ({}) {}",
                output.name,
                output.wear.as_deref().unwrap_or("-"),
                output.price_text
            );
        }
    }
}

/// JSON array of the first `top` contract summaries
pub fn contracts_json(contracts: &[TradeUpContract], top: usize) -> Result<String> {
    let summaries: Vec<ContractSummary> = contracts.iter().take(top).map(TradeUpContract::summary).collect();
    serde_json::to_string_pretty(&summaries).context("Failed to serialize contract summaries")
}

pub fn log_event(event: &ScrapeEvent) {
    match event {
        ScrapeEvent::Started { category, total_pages } => {
            info!("Started {} ({} page(s))", category, total_pages);
        }
        ScrapeEvent::Progress(progress) => {
            let recent: Vec<String> = progress
                .recent_listings
                .iter()
                .map(|l| format!("{} {}", l.name, l.price_text))
                .collect();
            info!(
                "{}: page {}/{}, {} item(s), latest: {}",
                progress.category,
                progress.pages_done,
                progress.total_pages,
                progress.items_so_far,
                recent.join(" | ")
            );
        }
        ScrapeEvent::Finished { category, items } => {
            info!("Finished {} with {} item(s)", category, items);
        }
        ScrapeEvent::Aborted { category, items, reason } => {
            warn!("Aborted {} after {} item(s): {}", category, items, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::models::{Listing, RiskLevel};

    fn listing(name: &str, price: &str) -> Listing {
        Listing {
            name: name.to_string(),
            price_text: price.to_string(),
            price_amount: dec!(1),
            is_stat_trak: false,
            is_souvenir: false,
            wear: Some("Field-Tested".to_string()),
            page_index: 1,
            item_index: 0,
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn test_contracts_json_shape() {
        let contract = TradeUpContract {
            inputs: vec![listing("P250 | Sand Dune", "$0.10")],
            potential_outputs: vec![listing("P250 | Asiimov", "$5.00")],
            cost: dec!(1.00),
            expected_value: dec!(5.00),
            profit_margin: dec!(400),
            risk_level: RiskLevel::Low,
            float_range: (0.265, 0.265),
            success_chance: 0.5,
        };

        let json = contracts_json(&[contract.clone(), contract], 1).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let summaries = value.as_array().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0]["riskLevel"], "Low");
        assert_eq!(summaries[0]["inputItems"][0]["name"], "P250 | Sand Dune");
        assert_eq!(summaries[0]["potentialOutputs"][0]["price"], "$5.00");
    }
}
