//! Deterministic scoring: evidence-adjusted pain, opportunity grade, market
//! sizing and the break-even model.

pub mod evidence;
pub mod finance;
pub mod market_size;
pub mod opportunity;

pub use evidence::{
    adjust_pain_score, assess_evidence, Credibility, EvidenceItem, EvidenceKind, EvidenceTier,
    PainAssessment, PainIntensity, PainVerdict, SourceSite, SOURCE_SITES,
};
pub use finance::{build_model, FinancialModel, MonthProjection};
pub use market_size::{format_value, parse_money, validate_market_size, MarketSizing, SizingRequest};
pub use opportunity::{
    growth_score, market_size_score, opportunity_score, Grade, MarketStructure, OpportunityInputs,
    OpportunityScore,
};
