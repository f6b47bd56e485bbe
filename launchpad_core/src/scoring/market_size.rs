//! TAM / SAM / SOM sanity checks.
//!
//! All amounts are in millions of US dollars. Model-written estimates tend to
//! quote global figures for local ideas, so the validator caps by industry and
//! rescales estimates that are implausibly large for the target geography.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::scoring::opportunity::MarketStructure;

pub const DEFAULT_SEGMENT_RATIO: f64 = 0.20;
/// SOM below this many millions triggers a warning ($100K).
pub const MIN_VIABLE_SOM: f64 = 0.1;

/// Industry ceilings on TAM in millions.
const INDUSTRY_CAPS: &[(&str, f64)] = &[
    ("saas", 500_000.0),
    ("fintech", 1_000_000.0),
    ("healthtech", 800_000.0),
    ("edtech", 400_000.0),
    ("e-commerce", 6_000_000.0),
    ("ecommerce", 6_000_000.0),
    ("marketplace", 2_000_000.0),
    ("food & beverage", 1_500_000.0),
    ("food and beverage", 1_500_000.0),
    ("retail", 5_000_000.0),
    ("logistics", 1_500_000.0),
    ("real estate", 3_000_000.0),
    ("travel", 1_000_000.0),
    ("media", 800_000.0),
    ("gaming", 300_000.0),
    ("cleantech", 1_000_000.0),
    ("agritech", 500_000.0),
];
const DEFAULT_INDUSTRY_CAP: f64 = 1_000_000.0;

/// Share of world spending by geography.
const GEO_RATIOS: &[(&[&str], f64)] = &[
    (&["global", "worldwide", "world"], 1.0),
    (&["usa", "us", "united states", "united states of america", "america"], 0.25),
    (&["europe", "eu", "european union"], 0.25),
    (&["china"], 0.18),
    (&["germany"], 0.045),
    (&["uk", "united kingdom", "britain", "england"], 0.04),
    (&["india"], 0.03),
    (&["france"], 0.03),
    (&["canada"], 0.02),
    (&["saudi arabia", "ksa"], 0.01),
    (&["uae", "united arab emirates", "dubai", "abu dhabi"], 0.008),
    (&["egypt"], 0.005),
];
const DEFAULT_GEO_RATIO: f64 = 0.01;

static MONEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<cur>us\$|usd|aed|sar|eur|gbp|\$|€|£)?\s*(?P<num>[0-9][0-9,]*(?:\.[0-9]+)?)(?:\s*(?:-|–|to)\s*\$?[0-9][0-9,]*(?:\.[0-9]+)?)?\s*(?P<unit>trillion|billion|million|thousand|tn|bn|mn|mm|t|b|m|k)?\b",
    )
    .expect("valid regex")
});

fn is_year(number: &str) -> bool {
    number.len() == 4 && number.parse::<u32>().map_or(false, |y| (1900..=2100).contains(&y))
}

/// Parse a money amount such as `"$12.5 billion"` or `"4T"` into millions.
///
/// Amounts with a unit win over amounts with only a currency marker, which
/// win over bare numbers. Bare year-like numbers are ignored, a range takes
/// its lower bound, and a bare number is taken as dollars.
pub fn parse_money(text: &str) -> Option<f64> {
    let mut best: Option<(u8, f64)> = None;
    for caps in MONEY.captures_iter(text) {
        let raw = caps.name("num")?.as_str();
        let unit = caps.name("unit").map(|m| m.as_str().to_ascii_lowercase());
        let has_currency = caps.name("cur").is_some();
        if unit.is_none() && !has_currency && is_year(raw) {
            continue;
        }
        let Ok(number) = raw.replace(',', "").parse::<f64>() else {
            continue;
        };
        let millions = match unit.as_deref().unwrap_or_default() {
            "trillion" | "tn" | "t" => number * 1_000_000.0,
            "billion" | "bn" | "b" => number * 1_000.0,
            "million" | "mn" | "mm" | "m" => number,
            "thousand" | "k" => number / 1_000.0,
            _ => number / 1_000_000.0,
        };
        let rank = match (unit.is_some(), has_currency) {
            (true, _) => 2,
            (false, true) => 1,
            (false, false) => 0,
        };
        if best.map_or(true, |(top, _)| rank > top) {
            best = Some((rank, millions));
        }
    }
    best.map(|(_, millions)| millions)
}

/// Human-readable amount for a value in millions, one decimal.
pub fn format_value(millions: f64) -> String {
    if millions >= 1_000_000.0 {
        format!("${:.1} Trillion", millions / 1_000_000.0)
    } else if millions >= 1_000.0 {
        format!("${:.1} Billion", millions / 1_000.0)
    } else if millions >= 1.0 {
        format!("${millions:.1} Million")
    } else {
        format!("${:.1} Thousand", millions * 1_000.0)
    }
}

pub fn industry_cap(industry: &str) -> f64 {
    let key = industry.trim().to_ascii_lowercase();
    INDUSTRY_CAPS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, cap)| *cap)
        .unwrap_or(DEFAULT_INDUSTRY_CAP)
}

/// TAM assumed when no estimate is available: 1% of the industry cap.
pub fn industry_default_tam(industry: &str) -> f64 {
    industry_cap(industry) / 100.0
}

pub fn geo_ratio(geography: &str) -> f64 {
    let key = geography.trim().to_ascii_lowercase();
    if key.is_empty() {
        return 1.0;
    }
    GEO_RATIOS
        .iter()
        .find(|(aliases, _)| aliases.contains(&key.as_str()))
        .map(|(_, ratio)| *ratio)
        .unwrap_or(DEFAULT_GEO_RATIO)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizingRequest {
    pub raw_tam: Option<String>,
    pub industry: String,
    pub geography: String,
    pub competitor_count: usize,
    /// Funded teams can plan for the upper part of the SOM range.
    pub funded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSizing {
    pub raw_tam: Option<String>,
    pub parsed_millions: f64,
    pub industry: String,
    pub industry_cap: f64,
    pub geography: String,
    pub geo_ratio: f64,
    pub rescaled_from_global: bool,
    pub tam: f64,
    pub sam: f64,
    pub som: f64,
    pub som_pct: f64,
    pub market_structure: MarketStructure,
    pub tam_text: String,
    pub sam_text: String,
    pub som_text: String,
    pub warnings: Vec<String>,
}

pub fn validate_market_size(request: &SizingRequest) -> MarketSizing {
    let mut warnings = Vec::new();
    let parsed = match request.raw_tam.as_deref().and_then(parse_money) {
        Some(value) if value > 0.0 => value,
        _ => {
            let fallback = industry_default_tam(&request.industry);
            warnings.push(format!(
                "no usable TAM estimate; using industry default {}",
                format_value(fallback)
            ));
            fallback
        }
    };

    let cap = industry_cap(&request.industry);
    let capped = if parsed > cap {
        warnings.push(format!(
            "TAM {} exceeds the {} ceiling for {}; capped",
            format_value(parsed),
            format_value(cap),
            request.industry
        ));
        cap
    } else {
        parsed
    };

    let ratio = geo_ratio(&request.geography);
    let rescaled_from_global = ratio < 1.0 && parsed > cap * 0.5;
    let tam = if rescaled_from_global {
        warnings.push(format!(
            "estimate looks global for {}; rescaled by {:.3}",
            request.geography,
            ratio * 2.0
        ));
        capped * ratio * 2.0
    } else {
        capped
    };

    let sam = tam * DEFAULT_SEGMENT_RATIO;
    let structure = MarketStructure::from_competitor_count(request.competitor_count);
    let (low, high) = structure.som_range_pct();
    let som_pct = if request.funded {
        low + 0.75 * (high - low)
    } else {
        (low + high) / 2.0
    };
    let som = sam * som_pct / 100.0;
    if som < MIN_VIABLE_SOM {
        warnings.push(format!(
            "obtainable market {} is below $100K; the business may not be viable",
            format_value(som)
        ));
    }

    MarketSizing {
        raw_tam: request.raw_tam.clone(),
        parsed_millions: parsed,
        industry: request.industry.clone(),
        industry_cap: cap,
        geography: request.geography.clone(),
        geo_ratio: ratio,
        rescaled_from_global,
        tam,
        sam,
        som,
        som_pct,
        market_structure: structure,
        tam_text: format_value(tam),
        sam_text: format_value(sam),
        som_text: format_value(som),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= b.abs() * 1e-9
    }

    #[test]
    fn global_saas_estimate_for_uae_is_rescaled() {
        let sizing = validate_market_size(&SizingRequest {
            raw_tam: Some("$10 Trillion".to_string()),
            industry: "SaaS".to_string(),
            geography: "UAE".to_string(),
            competitor_count: 12,
            funded: false,
        });
        assert!(close(sizing.parsed_millions, 10_000_000.0));
        assert_eq!(sizing.industry_cap, 500_000.0);
        assert!(sizing.rescaled_from_global);
        assert!(close(sizing.tam, 8_000.0));
        assert_eq!(sizing.tam_text, "$8.0 Billion");
        assert!(close(sizing.sam, 1_600.0));
        assert_eq!(sizing.som_pct, 3.0);
        assert!(close(sizing.som, 48.0));
    }

    #[test]
    fn local_estimates_are_kept() {
        let sizing = validate_market_size(&SizingRequest {
            raw_tam: Some("USD 2.5 billion".to_string()),
            industry: "Logistics".to_string(),
            geography: "Egypt".to_string(),
            competitor_count: 1,
            funded: true,
        });
        assert!(!sizing.rescaled_from_global);
        assert!(close(sizing.tam, 2_500.0));
        assert!(close(sizing.som_pct, 0.4));
    }

    #[test]
    fn tiny_markets_warn() {
        let sizing = validate_market_size(&SizingRequest {
            raw_tam: Some("$2M".to_string()),
            industry: "Other".to_string(),
            geography: "Global".to_string(),
            competitor_count: 1,
            funded: false,
        });
        assert!(sizing.som < MIN_VIABLE_SOM);
        assert!(sizing.warnings.iter().any(|w| w.contains("below $100K")));
    }

    #[test]
    fn missing_estimate_uses_industry_default() {
        let sizing = validate_market_size(&SizingRequest {
            raw_tam: Some("unknown".to_string()),
            industry: "SaaS".to_string(),
            geography: "Global".to_string(),
            competitor_count: 4,
            funded: false,
        });
        assert!(close(sizing.tam, 5_000.0));
    }

    #[test]
    fn years_and_ranges_do_not_hide_the_amount() {
        assert_eq!(parse_money("In 2024 the global TAM is $5 billion"), Some(5_000.0));
        assert_eq!(parse_money("$5-10 billion"), Some(5_000.0));
        assert_eq!(parse_money("USD 3 to 4 million by 2030"), Some(3.0));
        assert_eq!(parse_money("Expected in 2027"), None);
    }

    #[test]
    fn parse_and_format_round_trip() {
        for (text, millions) in [
            ("$100K", 0.1),
            ("$1M", 1.0),
            ("$250M", 250.0),
            ("$12B", 12_000.0),
            ("$4T", 4_000_000.0),
        ] {
            let parsed = parse_money(text).unwrap();
            assert!(close(parsed, millions), "{text}");
            let reparsed = parse_money(&format_value(parsed)).unwrap();
            assert!(close(reparsed, millions), "{text}");
        }
        assert_eq!(parse_money("1,500 million"), Some(1_500.0));
        assert_eq!(parse_money("no number"), None);
        assert_eq!(parse_money("4000000"), Some(4.0));
        assert_eq!(format_value(0.25), "$250.0 Thousand");
    }
}
