//! Application configuration loaded from a JSON file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::CategoryDescriptor;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const FACTORY_NEW: &str = "Factory New";
/// Upper bound for `scraping.max_retries`; the backoff doubles per retry
const MAX_RETRIES_LIMIT: u32 = 16;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub scraping: ScrapingConfig,
    pub analysis: AnalysisConfig,
    /// Extra or replacement category entries layered over the built-in catalog
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryDescriptor>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapingConfig {
    /// Search page URL with a `{tag}` placeholder
    pub search_url_pattern: String,
    /// Per-page suffix with a `{page}` placeholder
    pub page_suffix_pattern: String,
    #[serde(default)]
    pub user_agents: Vec<String>,
    #[serde(default)]
    pub proxies: Vec<String>,
    pub max_retries: u32,
    /// Seconds
    pub min_delay: f64,
    /// Seconds
    pub max_delay: f64,
    #[serde(default = "default_backoff_min")]
    pub backoff_min: f64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_true")]
    pub save_progress: bool,
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    pub webdriver_url: Option<String>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
}

fn default_backoff_min() -> f64 {
    10.0
}

fn default_backoff_max() -> f64 {
    20.0
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_output_path() -> PathBuf {
    PathBuf::from("items.json")
}

fn default_probe_timeout() -> u64 {
    10
}

impl ScrapingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Percent
    pub min_profit_margin: Decimal,
    /// Wear label → `[lo, hi]` float bounds
    pub wear_ranges: BTreeMap<String, (f64, f64)>,
    pub trade_up_rules: TradeUpRulesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeUpRulesConfig {
    pub contract_size: usize,
    pub max_candidates_per_group: usize,
    #[serde(default = "default_max_search_steps")]
    pub max_search_steps: usize,
    pub min_float_difference: f64,
    pub max_float_difference: f64,
    /// Lowest tier first
    pub rarity_levels: Vec<String>,
}

fn default_max_search_steps() -> usize {
    1_000_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// `ConfigurationMissing` when the file or a required value is absent,
    /// `Invalid` when it cannot be parsed or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ConfigError::ConfigurationMissing(format!("config file {}", path.display()))
            }
            _ => ConfigError::Invalid(format!("failed to read {}: {e}", path.display())),
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents).map_err(|e| {
            let message = e.to_string();
            if message.starts_with("missing field") {
                ConfigError::ConfigurationMissing(message)
            } else {
                ConfigError::Invalid(message)
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let scraping = &self.scraping;
        if !scraping.search_url_pattern.contains("{tag}") {
            return Err(ConfigError::Invalid(
                "scraping.search_url_pattern needs a {tag} placeholder".to_string(),
            ));
        }
        if !scraping.page_suffix_pattern.contains("{page}") {
            return Err(ConfigError::Invalid(
                "scraping.page_suffix_pattern needs a {page} placeholder".to_string(),
            ));
        }
        if scraping.min_delay < 0.0 || scraping.min_delay > scraping.max_delay {
            return Err(ConfigError::Invalid(format!(
                "scraping delays must satisfy 0 <= min_delay <= max_delay (got {} and {})",
                scraping.min_delay, scraping.max_delay
            )));
        }
        if scraping.backoff_min <= 0.0 || scraping.backoff_min >= scraping.backoff_max {
            return Err(ConfigError::Invalid(
                "scraping backoff must satisfy 0 < backoff_min < backoff_max".to_string(),
            ));
        }
        if scraping.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "scraping.max_retries must be at most {MAX_RETRIES_LIMIT} (got {})",
                scraping.max_retries
            )));
        }

        let analysis = &self.analysis;
        let rules = &analysis.trade_up_rules;
        if rules.contract_size == 0 {
            return Err(ConfigError::Invalid(
                "analysis.trade_up_rules.contract_size must be positive".to_string(),
            ));
        }
        if rules.rarity_levels.is_empty() {
            return Err(ConfigError::ConfigurationMissing(
                "analysis.trade_up_rules.rarity_levels".to_string(),
            ));
        }
        if rules.min_float_difference > rules.max_float_difference {
            return Err(ConfigError::Invalid(
                "min_float_difference must not exceed max_float_difference".to_string(),
            ));
        }
        if !analysis.wear_ranges.contains_key(FACTORY_NEW) {
            return Err(ConfigError::ConfigurationMissing(format!(
                "analysis.wear_ranges.{FACTORY_NEW}"
            )));
        }
        if let Some((label, _)) = analysis
            .wear_ranges
            .iter()
            .find(|(_, (lo, hi))| !(0.0..=1.0).contains(lo) || !(0.0..=1.0).contains(hi) || lo > hi)
        {
            return Err(ConfigError::Invalid(format!(
                "wear range for {label} must lie within [0, 1] with lo <= hi"
            )));
        }
        if analysis.max_price <= Decimal::ZERO {
            return Err(ConfigError::Invalid("analysis.max_price must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED: &str = include_str!("../../config.json");

    #[test]
    fn test_shipped_config_parses() {
        let config = AppConfig::from_json(SHIPPED).unwrap();
        assert_eq!(config.analysis.trade_up_rules.contract_size, 10);
        assert_eq!(config.analysis.trade_up_rules.rarity_levels[0], "Mil-Spec");
        assert!(config.analysis.wear_ranges.contains_key(FACTORY_NEW));
        assert_eq!(config.scraping.output_path, PathBuf::from("items.json"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_section_is_configuration_missing() {
        let err = AppConfig::from_json(r#"{"scraping": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigurationMissing(_)), "{err}");
    }

    #[test]
    fn test_missing_file_is_configuration_missing() {
        let err = AppConfig::load("/definitely/not/here/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_factory_new_required() {
        let mut value: serde_json::Value = serde_json::from_str(SHIPPED).unwrap();
        value["analysis"]["wear_ranges"]
            .as_object_mut()
            .unwrap()
            .remove(FACTORY_NEW);
        let err = AppConfig::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_inverted_delays_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(SHIPPED).unwrap();
        value["scraping"]["min_delay"] = serde_json::json!(9.0);
        value["scraping"]["max_delay"] = serde_json::json!(1.0);
        let err = AppConfig::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_excessive_retries_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(SHIPPED).unwrap();
        value["scraping"]["max_retries"] = serde_json::json!(MAX_RETRIES_LIMIT);
        assert!(AppConfig::from_json(&value.to_string()).is_ok());

        value["scraping"]["max_retries"] = serde_json::json!(1000);
        let err = AppConfig::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }
}
