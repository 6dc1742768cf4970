//! Trade-up contract search
//!
//! Listings are grouped by rarity tier. Every tier that has listings one tier
//! above it becomes a source group: fixed-size input combinations are
//! enumerated under a cost ceiling and scored against the whole next-tier
//! pool. Groups are independent and searched in parallel.

use std::collections::BTreeMap;

use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{AnalysisConfig, FACTORY_NEW};
use crate::models::{Listing, RiskLevel, TradeUpContract};
use crate::rarity::{RarityLadder, RarityTier};

/// Numeric limits applied by the search
#[derive(Debug, Clone)]
pub struct TradeUpRules {
    pub contract_size: usize,
    pub max_candidates_per_group: usize,
    /// Hard bound on enumeration steps per group
    pub max_search_steps: usize,
    pub max_price: Decimal,
    pub min_profit_margin: Decimal,
    pub min_float_difference: f64,
    pub max_float_difference: f64,
}

/// Wear label → float range table.
///
/// Listing text never exposes an item's exact float, so each wear label is
/// approximated by the midpoint of its range.
#[derive(Debug, Clone)]
pub struct WearTable {
    ranges: BTreeMap<String, (f64, f64)>,
}

impl WearTable {
    pub fn new(ranges: BTreeMap<String, (f64, f64)>) -> Self {
        Self { ranges }
    }

    /// `lo + (hi - lo) * midpoint(wear)`, or the middle of `[lo, hi]` for
    /// unknown or absent wear.
    pub fn float_value(&self, min_float: f64, max_float: f64, wear: Option<&str>) -> f64 {
        match wear.and_then(|w| self.ranges.get(w)) {
            Some((wear_lo, wear_hi)) => min_float + (max_float - min_float) * ((wear_lo + wear_hi) / 2.0),
            None => (min_float + max_float) / 2.0,
        }
    }

    pub fn normalized(&self, wear: Option<&str>) -> f64 {
        self.float_value(0.0, 1.0, wear)
    }
}

/// A set of inputs awaiting scoring against its output pool
struct TradeUpCandidate<'a> {
    inputs: Vec<&'a Listing>,
    output_pool: &'a [&'a Listing],
}

pub struct TradeUpSearch {
    rules: TradeUpRules,
    ladder: RarityLadder,
    wear: WearTable,
}

impl TradeUpSearch {
    pub fn new(rules: TradeUpRules, ladder: RarityLadder, wear: WearTable) -> Self {
        Self { rules, ladder, wear }
    }

    pub fn from_config(analysis: &AnalysisConfig) -> Self {
        let trade_up = &analysis.trade_up_rules;
        let rules = TradeUpRules {
            contract_size: trade_up.contract_size,
            max_candidates_per_group: trade_up.max_candidates_per_group,
            max_search_steps: trade_up.max_search_steps,
            max_price: analysis.max_price,
            min_profit_margin: analysis.min_profit_margin,
            min_float_difference: trade_up.min_float_difference,
            max_float_difference: trade_up.max_float_difference,
        };
        let ladder = RarityLadder::new(trade_up.rarity_levels.clone()).unwrap_or_default();
        Self::new(rules, ladder, WearTable::new(analysis.wear_ranges.clone()))
    }

    /// Ranked contracts, best profit margin first. Ties keep enumeration order.
    pub fn find_opportunities(&self, listings: &[Listing]) -> Vec<TradeUpContract> {
        let mut groups: BTreeMap<RarityTier, Vec<&Listing>> = BTreeMap::new();
        for listing in listings {
            groups
                .entry(self.ladder.classify(&listing.name))
                .or_default()
                .push(listing);
        }

        let sources: Vec<(RarityTier, &[&Listing], &[&Listing])> = groups
            .iter()
            .filter_map(|(&tier, inputs)| {
                let next = self.ladder.next_tier(tier)?;
                let pool = groups.get(&next).filter(|pool| !pool.is_empty())?;
                Some((tier, inputs.as_slice(), pool.as_slice()))
            })
            .collect();

        let mut contracts: Vec<TradeUpContract> = sources
            .par_iter()
            .map(|(tier, inputs, pool)| {
                let found = self.search_group(inputs, pool);
                debug!(
                    "{} group: {} input(s), {} output(s), {} contract(s)",
                    self.ladder.name(*tier),
                    inputs.len(),
                    pool.len(),
                    found.len()
                );
                found
            })
            .flatten()
            .collect();

        contracts.sort_by(|a, b| b.profit_margin.cmp(&a.profit_margin));
        contracts
    }

    fn search_group(&self, inputs: &[&Listing], pool: &[&Listing]) -> Vec<TradeUpContract> {
        let expected_value = mean_price(pool);
        self.enumerate_inputs(inputs)
            .into_iter()
            .map(|inputs| TradeUpCandidate { inputs, output_pool: pool })
            .filter_map(|candidate| self.score(candidate, expected_value))
            .collect()
    }

    /// Lexicographic `contract_size`-subsets whose cost stays within the
    /// ceiling, at most `max_candidates_per_group` of them.
    fn enumerate_inputs<'a>(&self, group: &[&'a Listing]) -> Vec<Vec<&'a Listing>> {
        let size = self.rules.contract_size;
        if size == 0 || group.len() < size || self.rules.max_candidates_per_group == 0 {
            return Vec::new();
        }

        let mut walk = CombinationWalk {
            group,
            size,
            max_price: self.rules.max_price,
            max_found: self.rules.max_candidates_per_group,
            steps_left: self.rules.max_search_steps,
            picked: Vec::with_capacity(size),
            found: Vec::new(),
        };
        walk.extend(0, Decimal::ZERO);
        walk.found
    }

    fn score(&self, candidate: TradeUpCandidate<'_>, expected_value: Decimal) -> Option<TradeUpContract> {
        let cost: Decimal = candidate.inputs.iter().map(|l| l.price_amount).sum();
        if cost <= Decimal::ZERO {
            return None;
        }

        let profit_margin = (expected_value - cost) / cost * Decimal::ONE_HUNDRED;
        if profit_margin < self.rules.min_profit_margin {
            return None;
        }

        let floats: Vec<f64> = candidate
            .inputs
            .iter()
            .map(|l| self.wear.normalized(l.wear.as_deref()))
            .collect();
        let float_range = floats
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &f| (lo.min(f), hi.max(f)));
        let success_chance = self.success_chance(&floats);

        Some(TradeUpContract {
            inputs: candidate.inputs.into_iter().cloned().collect(),
            potential_outputs: candidate.output_pool.iter().map(|&l| l.clone()).collect(),
            cost,
            expected_value,
            profit_margin,
            risk_level: risk_level(profit_margin, success_chance),
            float_range,
            success_chance,
        })
    }

    fn success_chance(&self, input_floats: &[f64]) -> f64 {
        let target = self.wear.normalized(Some(FACTORY_NEW));
        let average = input_floats.iter().sum::<f64>() / input_floats.len() as f64;
        let diff = (average - target).abs();

        if diff <= self.rules.min_float_difference {
            0.95
        } else if diff <= self.rules.max_float_difference {
            0.75
        } else {
            0.50
        }
    }
}

pub fn risk_level(profit_margin: Decimal, success_chance: f64) -> RiskLevel {
    if profit_margin < Decimal::ZERO {
        RiskLevel::High
    } else if profit_margin > Decimal::from(50) && success_chance > 0.8 {
        RiskLevel::Low
    } else if profit_margin > Decimal::from(20) && success_chance > 0.6 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

fn mean_price(listings: &[&Listing]) -> Decimal {
    if listings.is_empty() {
        return Decimal::ZERO;
    }
    let total: Decimal = listings.iter().map(|l| l.price_amount).sum();
    total / Decimal::from(listings.len())
}

/// Depth-first subset enumeration. Prices are non-negative, so a partial
/// sum above the ceiling rules out every extension of it.
struct CombinationWalk<'g, 'a> {
    group: &'g [&'a Listing],
    size: usize,
    max_price: Decimal,
    max_found: usize,
    steps_left: usize,
    picked: Vec<&'a Listing>,
    found: Vec<Vec<&'a Listing>>,
}

impl CombinationWalk<'_, '_> {
    /// Returns false once enumeration must stop.
    fn extend(&mut self, start: usize, cost: Decimal) -> bool {
        if self.steps_left == 0 {
            return false;
        }
        self.steps_left -= 1;

        if self.picked.len() == self.size {
            if cost > Decimal::ZERO {
                self.found.push(self.picked.clone());
            }
            return self.found.len() < self.max_found;
        }

        let remaining = self.size - self.picked.len();
        for index in start..=self.group.len() - remaining {
            let listing = self.group[index];
            let cost = cost + listing.price_amount;
            if cost > self.max_price {
                continue;
            }
            self.picked.push(listing);
            let keep_going = self.extend(index + 1, cost);
            self.picked.pop();
            if !keep_going {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use crate::normalizer::normalize;

    fn wear_table() -> WearTable {
        let mut ranges = BTreeMap::new();
        ranges.insert("Factory New".to_string(), (0.0, 0.07));
        ranges.insert("Minimal Wear".to_string(), (0.07, 0.15));
        ranges.insert("Field-Tested".to_string(), (0.15, 0.38));
        ranges.insert("Well-Worn".to_string(), (0.38, 0.45));
        ranges.insert("Battle-Scarred".to_string(), (0.45, 1.0));
        WearTable::new(ranges)
    }

    fn rules() -> TradeUpRules {
        TradeUpRules {
            contract_size: 10,
            max_candidates_per_group: 100,
            max_search_steps: 1_000_000,
            max_price: dec!(100),
            min_profit_margin: dec!(0),
            min_float_difference: 0.05,
            max_float_difference: 0.15,
        }
    }

    fn search(rules: TradeUpRules) -> TradeUpSearch {
        TradeUpSearch::new(rules, RarityLadder::default(), wear_table())
    }

    fn listing(raw_name: &str, price: &str, item_index: u32) -> Listing {
        normalize(raw_name, price)
            .unwrap()
            .into_listing(1, item_index, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn mil_spec(count: usize, price: &str, wear: &str) -> Vec<Listing> {
        (0..count)
            .map(|i| listing(&format!("P250 | Sand Dune {i} ({wear})"), price, i as u32 + 1))
            .collect()
    }

    #[test]
    fn test_end_to_end_single_contract() {
        let mut listings = mil_spec(10, "$1.00", "Factory New");
        listings.push(listing("Restricted Rifle A (Field-Tested)", "$20.00", 11));
        listings.push(listing("Restricted Rifle B (Field-Tested)", "$30.00", 12));

        let contracts = search(rules()).find_opportunities(&listings);
        assert_eq!(contracts.len(), 1);

        let contract = &contracts[0];
        assert_eq!(contract.cost, dec!(10));
        assert_eq!(contract.expected_value, dec!(25));
        assert_eq!(contract.profit_margin, dec!(150));
        assert_eq!(contract.success_chance, 0.95);
        assert_eq!(contract.risk_level, RiskLevel::Low);
        assert_eq!(contract.inputs.len(), 10);
        assert_eq!(contract.potential_outputs.len(), 2);
        assert!((contract.float_range.0 - 0.035).abs() < 1e-12);
        assert!((contract.float_range.1 - 0.035).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        assert!(search(rules()).find_opportunities(&[]).is_empty());
    }

    #[test]
    fn test_group_smaller_than_contract_size() {
        let mut listings = mil_spec(9, "$1.00", "Factory New");
        listings.push(listing("Restricted Rifle (Minimal Wear)", "$50.00", 10));
        assert!(search(rules()).find_opportunities(&listings).is_empty());
    }

    #[test]
    fn test_tier_without_next_tier_pool_is_skipped() {
        let mut listings = mil_spec(10, "$1.00", "Factory New");
        listings.push(listing("Classified Pistol (Factory New)", "$80.00", 11));
        assert!(search(rules()).find_opportunities(&listings).is_empty());
    }

    #[test]
    fn test_candidate_cap_and_lexicographic_order() {
        let mut listings = mil_spec(12, "$1.00", "Minimal Wear");
        listings.push(listing("Restricted Rifle (Field-Tested)", "$40.00", 13));

        let mut capped = rules();
        capped.max_candidates_per_group = 5;
        let contracts = search(capped).find_opportunities(&listings);
        assert_eq!(contracts.len(), 5);

        // first combination is the first ten listings in input order
        let first: Vec<u32> = contracts[0].inputs.iter().map(|l| l.item_index).collect();
        assert_eq!(first, (1..=10).collect::<Vec<_>>());
        let second: Vec<u32> = contracts[1].inputs.iter().map(|l| l.item_index).collect();
        assert_eq!(second, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 11]);
    }

    #[test]
    fn test_cost_ceiling_and_profit_floor() {
        let mut listings = mil_spec(10, "$11.00", "Factory New");
        listings.push(listing("Restricted Rifle (Factory New)", "$500.00", 11));
        // 10 x $11 exceeds the $100 ceiling
        assert!(search(rules()).find_opportunities(&listings).is_empty());

        let mut listings = mil_spec(10, "$5.00", "Factory New");
        listings.push(listing("Restricted Rifle (Factory New)", "$40.00", 11));
        // margin is -20%
        assert!(search(rules()).find_opportunities(&listings).is_empty());

        let mut losing = rules();
        losing.min_profit_margin = dec!(-100);
        let contracts = search(losing).find_opportunities(&listings);
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].profit_margin, dec!(-20));
        assert_eq!(contracts[0].risk_level, RiskLevel::High);
    }

    #[test]
    fn test_zero_cost_contracts_rejected() {
        let mut listings = mil_spec(10, "$0.00", "Factory New");
        listings.push(listing("Restricted Rifle (Factory New)", "$4.00", 11));
        assert!(search(rules()).find_opportunities(&listings).is_empty());
    }

    #[test]
    fn test_currency_formatting_does_not_change_results() {
        let pool = |price: &str| listing("Restricted Rifle (Well-Worn)", price, 99);

        let mut plain = mil_spec(10, "$1.50", "Field-Tested");
        plain.push(pool("$25.00"));
        let mut decorated = mil_spec(10, "Starting at:\n$1.50 USD", "Field-Tested");
        decorated.push(pool("$25.00 USD"));

        let a = search(rules()).find_opportunities(&plain);
        let b = search(rules()).find_opportunities(&decorated);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.cost, y.cost);
            assert_eq!(x.profit_margin, y.profit_margin);
        }
    }

    #[test]
    fn test_ranking_and_determinism() {
        let mut listings = mil_spec(11, "$1.00", "Battle-Scarred");
        listings[10].price_amount = dec!(0.50);
        listings.push(listing("Restricted Rifle (Field-Tested)", "$12.00", 20));
        listings.extend((0..10).map(|i| listing(&format!("Restricted Pistol {i} (Factory New)"), "$3.00", 30 + i)));
        listings.push(listing("Classified Knife (Factory New)", "$90.00", 50));

        let engine = search(rules());
        let first = engine.find_opportunities(&listings);
        let second = engine.find_opportunities(&listings);
        assert!(!first.is_empty());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert!(first.windows(2).all(|w| w[0].profit_margin >= w[1].profit_margin));
    }

    #[test]
    fn test_success_chance_buckets() {
        let engine = search(rules());
        assert_eq!(engine.success_chance(&[0.035; 10]), 0.95);
        assert_eq!(engine.success_chance(&[0.11; 10]), 0.75);
        assert_eq!(engine.success_chance(&[0.725; 10]), 0.50);
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(risk_level(dec!(-1), 0.95), RiskLevel::High);
        assert_eq!(risk_level(dec!(51), 0.95), RiskLevel::Low);
        assert_eq!(risk_level(dec!(51), 0.75), RiskLevel::Medium);
        assert_eq!(risk_level(dec!(21), 0.75), RiskLevel::Medium);
        assert_eq!(risk_level(dec!(21), 0.5), RiskLevel::High);
        assert_eq!(risk_level(dec!(10), 0.95), RiskLevel::High);
    }

    #[test]
    fn test_unknown_wear_is_midpoint() {
        let table = wear_table();
        assert_eq!(table.normalized(None), 0.5);
        assert_eq!(table.normalized(Some("Holo")), 0.5);
        assert!((table.normalized(Some("Battle-Scarred")) - 0.725).abs() < 1e-12);
    }
}
