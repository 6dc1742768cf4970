//! Normalization of raw listing text into structured fields

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::ScrapeError;
use crate::models::{Listing, RawListing};

const STAT_TRAK_MARKER: &str = "StatTrak";
const SOUVENIR_MARKER: &str = "Souvenir";

/// The parsed fields of one listing, without provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedListing {
    pub name: String,
    pub is_stat_trak: bool,
    pub is_souvenir: bool,
    pub wear: Option<String>,
    pub price_text: String,
    pub price_amount: Decimal,
}

impl NormalizedListing {
    pub fn into_listing(self, page_index: u32, item_index: u32, scraped_at: DateTime<Utc>) -> Listing {
        Listing {
            name: self.name,
            price_text: self.price_text,
            price_amount: self.price_amount,
            is_stat_trak: self.is_stat_trak,
            is_souvenir: self.is_souvenir,
            wear: self.wear,
            page_index,
            item_index,
            scraped_at,
        }
    }
}

pub fn normalize_raw(raw: &RawListing) -> Result<NormalizedListing, ScrapeError> {
    normalize(&raw.raw_name, &raw.raw_price_text)
}

/// Split a raw listing into name, flags, wear and price.
///
/// # Errors
/// `MalformedListing` when the price text holds no non-negative number.
pub fn normalize(raw_name: &str, raw_price_text: &str) -> Result<NormalizedListing, ScrapeError> {
    let raw_name = raw_name.trim();
    let is_stat_trak = raw_name.contains(STAT_TRAK_MARKER);
    let is_souvenir = raw_name.contains(SOUVENIR_MARKER);
    let wear = extract_wear(raw_name);

    let mut name = raw_name.to_string();
    if let Some(group) = first_paren_group(raw_name) {
        name = name.replacen(group, "", 1);
    }
    if is_stat_trak {
        name = name.replace("StatTrak™", "").replace(STAT_TRAK_MARKER, "");
    }
    if is_souvenir {
        name = name.replace(SOUVENIR_MARKER, "");
    }
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");

    let price_text = select_price_line(raw_price_text);
    let price_amount = parse_price(&price_text).ok_or_else(|| ScrapeError::MalformedListing {
        name: raw_name.to_string(),
        reason: format!("unparseable price {price_text:?}"),
    })?;

    Ok(NormalizedListing {
        name,
        is_stat_trak,
        is_souvenir,
        wear,
        price_text,
        price_amount,
    })
}

/// Contents of the first `( … )` group, if any and non-empty.
pub fn extract_wear(name: &str) -> Option<String> {
    let group = first_paren_group(name)?;
    let inner = group[1..group.len() - 1].trim();
    (!inner.is_empty()).then(|| inner.to_string())
}

fn first_paren_group(name: &str) -> Option<&str> {
    let open = name.find('(')?;
    let close = open + name[open..].find(')')?;
    Some(&name[open..=close])
}

/// The marketplace sometimes renders "original\ndiscounted" or
/// "Starting at:\n$0.03"; the second line holds the price.
fn select_price_line(raw: &str) -> String {
    let raw = raw.trim();
    let mut lines = raw.lines();
    let first = lines.next().unwrap_or_default();
    lines.next().unwrap_or(first).trim().to_string()
}

/// Parse a currency formatted amount such as `$1,234.56 USD` or `12,34€`.
pub fn parse_price(text: &str) -> Option<Decimal> {
    if text.contains('-') {
        return None;
    }

    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let kept = kept.trim_matches(|c| c == '.' || c == ',');
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = kept.rfind('.');
    let last_comma = kept.rfind(',');
    let cleaned = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = kept.len() - comma - 1;
            if kept.matches(',').count() == 1 && decimals == 2 {
                kept.replace(',', ".")
            } else {
                kept.replace(',', "")
            }
        }
        _ => kept.to_string(),
    };

    let amount = Decimal::from_str(&cleaned).ok()?;
    (amount >= Decimal::ZERO).then_some(amount)
}
