//! Typed records produced along the research chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::lenient::{bullets, lenient, number_of, text_of, text_or_empty};
use crate::scoring::{EvidenceItem, PainAssessment};

/// Most cost queries the finance step will run.
pub const MAX_FINANCIAL_QUERIES: usize = 3;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationQueries {
    #[serde(default, deserialize_with = "bullets")]
    pub problem: Vec<String>,
    #[serde(default, deserialize_with = "bullets")]
    pub solution: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketIdentity {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub industry: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub wikipedia_topic: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub target_country: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub currency_code: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub currency_symbol: String,
    #[serde(default, deserialize_with = "lenient")]
    pub market_size_estimate: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    #[serde(default, deserialize_with = "bullets")]
    pub competitor_queries: Vec<String>,
    #[serde(default)]
    pub validation_queries: ValidationQueries,
    #[serde(default)]
    pub market_identity: MarketIdentity,
    #[serde(default, deserialize_with = "bullets")]
    pub financial_queries: Vec<String>,
}

impl ResearchPlan {
    /// Plan derived from the idea text alone.
    pub fn fallback(idea: &str, problem: &str) -> Self {
        let idea = idea.trim();
        let problem = if problem.trim().is_empty() { idea } else { problem.trim() };
        Self {
            competitor_queries: vec![format!("{idea} competitors"), format!("{idea} alternatives")],
            validation_queries: ValidationQueries {
                problem: vec![format!("{problem} frustrating")],
                solution: vec![format!("looking for {idea}")],
            },
            market_identity: MarketIdentity {
                industry: "Other".to_string(),
                wikipedia_topic: idea.to_string(),
                target_country: "Global".to_string(),
                currency_code: "USD".to_string(),
                currency_symbol: "$".to_string(),
                market_size_estimate: None,
            },
            financial_queries: vec![format!("{idea} startup costs")],
        }
    }

    /// Fill whatever the model left empty from [`ResearchPlan::fallback`] and
    /// cap the cost queries.
    pub fn completed(mut self, idea: &str, problem: &str) -> Self {
        let fallback = Self::fallback(idea, problem);
        if self.competitor_queries.is_empty() {
            self.competitor_queries = fallback.competitor_queries;
        }
        if self.validation_queries.problem.is_empty() {
            self.validation_queries.problem = fallback.validation_queries.problem;
        }
        if self.validation_queries.solution.is_empty() {
            self.validation_queries.solution = fallback.validation_queries.solution;
        }
        if self.financial_queries.is_empty() {
            self.financial_queries = fallback.financial_queries;
        }
        self.financial_queries.truncate(MAX_FINANCIAL_QUERIES);

        let identity = &mut self.market_identity;
        let defaults = fallback.market_identity;
        for (field, default) in [
            (&mut identity.industry, defaults.industry),
            (&mut identity.wikipedia_topic, defaults.wikipedia_topic),
            (&mut identity.target_country, defaults.target_country),
            (&mut identity.currency_code, defaults.currency_code),
            (&mut identity.currency_symbol, defaults.currency_symbol),
        ] {
            if field.trim().is_empty() {
                *field = default;
            }
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    #[serde(rename = "Name", alias = "name", default, deserialize_with = "text_or_empty")]
    pub name: String,
    #[serde(rename = "Features", alias = "features", default, deserialize_with = "text_or_empty")]
    pub features: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CompetitorList {
    #[serde(default)]
    pub competitors: Vec<Competitor>,
}

/// Raw verdict from the research analyst before evidence adjustment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPainVerdict {
    #[serde(default, deserialize_with = "pain_points")]
    pub pain_score: f64,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "bullets")]
    pub key_quotes: Vec<String>,
}

fn pain_points<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(number_of(&value).unwrap_or(0.0).clamp(0.0, 100.0))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PainReport {
    pub assessment: PainAssessment,
    pub summary: String,
    pub key_quotes: Vec<String>,
    pub evidence: Vec<EvidenceItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueAssumptions {
    #[serde(default, deserialize_with = "amount")]
    pub daily_customers: f64,
    #[serde(default, deserialize_with = "amount")]
    pub avg_ticket_price: f64,
}

/// What the CFO persona returns; amounts arrive as numbers or strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinanceDraft {
    #[serde(default, deserialize_with = "amounts")]
    pub startup_costs: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "amounts")]
    pub monthly_fixed_costs: BTreeMap<String, f64>,
    #[serde(default)]
    pub revenue_assumptions: RevenueAssumptions,
    #[serde(default, deserialize_with = "bullets")]
    pub sources_used: Vec<String>,
}

fn amount<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(parse_amount(&value).unwrap_or(0.0))
}

fn amounts<'de, D: serde::Deserializer<'de>>(d: D) -> Result<BTreeMap<String, f64>, D::Error> {
    let serde_json::Value::Object(map) = serde_json::Value::deserialize(d)? else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .iter()
        .filter_map(|(item, value)| Some((item.clone(), parse_amount(value)?)))
        .filter(|(_, value)| value.is_finite() && *value >= 0.0)
        .collect())
}

/// `1200`, `"1,200"`, `"$1,200/month"`.
fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    let text = text_of(value)?;
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    digits.parse().ok()
}
