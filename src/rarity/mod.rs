//! Rarity ladder and name-based classification

/// Position of a tier on the ladder; higher is rarer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RarityTier(usize);

/// Ordered tier names, lowest first
#[derive(Debug, Clone)]
pub struct RarityLadder {
    tiers: Vec<String>,
}

impl RarityLadder {
    /// Returns `None` for an empty ladder.
    pub fn new(tiers: Vec<String>) -> Option<Self> {
        (!tiers.is_empty()).then_some(Self { tiers })
    }

    pub fn lowest(&self) -> RarityTier {
        RarityTier(0)
    }

    pub fn name(&self, tier: RarityTier) -> &str {
        &self.tiers[tier.0]
    }

    pub fn next_tier(&self, tier: RarityTier) -> Option<RarityTier> {
        let next = tier.0 + 1;
        (next < self.tiers.len()).then_some(RarityTier(next))
    }

    /// Highest tier whose name appears in `item_name`, else the lowest tier.
    pub fn classify(&self, item_name: &str) -> RarityTier {
        (1..self.tiers.len())
            .rev()
            .find(|&rank| item_name.contains(self.tiers[rank].as_str()))
            .map_or(self.lowest(), RarityTier)
    }
}

impl Default for RarityLadder {
    fn default() -> Self {
        Self {
            tiers: ["Mil-Spec", "Restricted", "Classified", "Covert"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
