use serde::{Deserialize, Serialize};
use std::fmt;

pub const PAIN_WEIGHT: f64 = 0.35;
pub const GROWTH_WEIGHT: f64 = 0.25;
pub const SIZE_WEIGHT: f64 = 0.25;
pub const COMPETITION_WEIGHT: f64 = 0.15;

/// Competitive structure inferred from the number of known competitors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStructure {
    #[serde(rename = "Winner-Take-All")]
    WinnerTakeAll,
    Concentrated,
    Competitive,
    Fragmented,
}

impl MarketStructure {
    pub fn from_competitor_count(count: usize) -> Self {
        match count {
            0..=2 => MarketStructure::WinnerTakeAll,
            3..=5 => MarketStructure::Concentrated,
            6..=15 => MarketStructure::Competitive,
            _ => MarketStructure::Fragmented,
        }
    }

    /// Share of the competition score a newcomer can expect.
    pub fn competition_factor(self) -> f64 {
        match self {
            MarketStructure::WinnerTakeAll => 1.0,
            MarketStructure::Concentrated => 0.8,
            MarketStructure::Competitive => 0.6,
            MarketStructure::Fragmented => 0.5,
        }
    }

    /// Obtainable share of SAM in percent, `(low, high)`.
    pub fn som_range_pct(self) -> (f64, f64) {
        match self {
            MarketStructure::WinnerTakeAll => (0.1, 0.5),
            MarketStructure::Concentrated => (0.5, 2.0),
            MarketStructure::Competitive => (1.0, 5.0),
            MarketStructure::Fragmented => (5.0, 15.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MarketStructure::WinnerTakeAll => "Winner-Take-All",
            MarketStructure::Concentrated => "Concentrated",
            MarketStructure::Competitive => "Competitive",
            MarketStructure::Fragmented => "Fragmented",
        }
    }
}

impl fmt::Display for MarketStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            Grade::A
        } else if score >= 70.0 {
            Grade::B
        } else if score >= 50.0 {
            Grade::C
        } else {
            Grade::D
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Grade::A => "Strong opportunity: validated pain in a large, growing market.",
            Grade::B => "Promising opportunity with gaps worth closing before scaling.",
            Grade::C => "Marginal opportunity: validate demand further before investing.",
            Grade::D => "Weak opportunity on current evidence.",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        f.write_str(letter)
    }
}

/// `(g + 50) × 2` clamped to `[0, 100]`: flat interest already scores 100 and
/// a halving scores 0.
pub fn growth_score(growth_pct: f64) -> f64 {
    ((growth_pct + 50.0) * 2.0).clamp(0.0, 100.0)
}

/// Score a TAM given in millions.
pub fn market_size_score(tam_millions: f64) -> f64 {
    match tam_millions {
        t if t >= 10_000.0 => 100.0,
        t if t >= 1_000.0 => 80.0,
        t if t >= 100.0 => 60.0,
        t if t >= 10.0 => 40.0,
        _ => 20.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpportunityInputs {
    pub adjusted_pain: f64,
    /// `None` when no trend source had data; scores 0.
    pub growth_pct: Option<f64>,
    pub market_size_score: f64,
    pub competitor_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpportunityScore {
    pub pain_score: f64,
    pub growth_score: f64,
    pub market_size_score: f64,
    pub competition_score: f64,
    pub market_structure: MarketStructure,
    pub total: f64,
    pub grade: Grade,
    /// Inputs that were unavailable and scored as zero evidence.
    #[serde(default)]
    pub missing_inputs: Vec<String>,
}

pub fn opportunity_score(inputs: OpportunityInputs) -> OpportunityScore {
    let pain_score = inputs.adjusted_pain.clamp(0.0, 100.0);
    let growth_score = inputs.growth_pct.map(growth_score).unwrap_or(0.0);
    let market_size_score = inputs.market_size_score.clamp(0.0, 100.0);
    let market_structure = MarketStructure::from_competitor_count(inputs.competitor_count);
    let competition_score = 100.0 * market_structure.competition_factor();
    let total = round1(
        pain_score * PAIN_WEIGHT
            + growth_score * GROWTH_WEIGHT
            + market_size_score * SIZE_WEIGHT
            + competition_score * COMPETITION_WEIGHT,
    );
    OpportunityScore {
        pain_score,
        growth_score,
        market_size_score,
        competition_score,
        market_structure,
        total,
        grade: Grade::from_score(total),
        missing_inputs: if inputs.growth_pct.is_none() {
            vec!["growth".to_string()]
        } else {
            Vec::new()
        },
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
