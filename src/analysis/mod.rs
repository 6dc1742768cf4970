//! Price and wear overview of a category's listings

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::Listing;

const UNKNOWN_WEAR: &str = "Unknown";

/// Upper bounds (exclusive) of the price buckets, in listing currency
const BUCKETS: &[(&str, Option<i64>)] = &[
    ("< $1", Some(1)),
    ("$1 - $5", Some(5)),
    ("$5 - $10", Some(10)),
    ("$10 - $50", Some(50)),
    ("$50 - $100", Some(100)),
    ("> $100", None),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub total_items: usize,
    pub average_price: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Bucket label and count, cheapest bucket first
    pub price_distribution: Vec<(String, usize)>,
    pub wear_distribution: BTreeMap<String, usize>,
    pub stat_trak_count: usize,
    pub souvenir_count: usize,
}

/// Summarize a set of listings. Returns `None` for an empty set.
pub fn summarize(listings: &[Listing]) -> Option<MarketSummary> {
    let first = listings.first()?;

    let mut total = Decimal::ZERO;
    let mut min_price = first.price_amount;
    let mut max_price = first.price_amount;
    let mut buckets = vec![0usize; BUCKETS.len()];
    let mut wear_distribution = BTreeMap::new();
    let mut stat_trak_count = 0;
    let mut souvenir_count = 0;

    for listing in listings {
        let price = listing.price_amount;
        total += price;
        min_price = min_price.min(price);
        max_price = max_price.max(price);
        buckets[bucket_of(price)] += 1;

        let wear = listing.wear.as_deref().unwrap_or(UNKNOWN_WEAR);
        *wear_distribution.entry(wear.to_string()).or_insert(0) += 1;

        stat_trak_count += usize::from(listing.is_stat_trak);
        souvenir_count += usize::from(listing.is_souvenir);
    }

    let average_price = (total / Decimal::from(listings.len())).round_dp(2);
    let price_distribution = BUCKETS
        .iter()
        .zip(buckets)
        .map(|((label, _), count)| ((*label).to_string(), count))
        .collect();

    Some(MarketSummary {
        total_items: listings.len(),
        average_price,
        min_price,
        max_price,
        price_distribution,
        wear_distribution,
        stat_trak_count,
        souvenir_count,
    })
}

/// Listings priced within `[min_price, max_price]`
pub fn count_in_range(listings: &[Listing], min_price: Decimal, max_price: Decimal) -> usize {
    listings
        .iter()
        .filter(|l| (min_price..=max_price).contains(&l.price_amount))
        .count()
}

fn bucket_of(price: Decimal) -> usize {
    BUCKETS
        .iter()
        .position(|(_, upper)| upper.is_none_or(|upper| price < Decimal::from(upper)))
        .unwrap_or(BUCKETS.len() - 1)
}
