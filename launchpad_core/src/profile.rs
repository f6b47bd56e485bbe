//! Startup profile model and the per-dimension projections fed to checks and
//! scoring.
//!
//! Founders submit the profile as loosely-filled JSON, so every field is
//! optional and unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupProfile {
    pub meta_data: MetaData,
    pub company_snapshot: CompanySnapshot,
    pub founder_and_team: FounderAndTeam,
    pub problem_definition: ProblemDefinition,
    pub product_and_solution: ProductAndSolution,
    pub market_and_scope: MarketAndScope,
    pub traction_metrics: TractionMetrics,
    pub gtm_strategy: GtmStrategy,
    pub business_model: BusinessModel,
    pub vision_and_strategy: VisionAndStrategy,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaData {
    pub form_type: Option<String>,
    pub last_updated: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanySnapshot {
    pub company_name: Option<String>,
    pub website_url: Option<String>,
    pub hq_location: Option<String>,
    pub date_founded: Option<String>,
    pub current_stage: Option<String>,
    pub amount_raised_to_date: Option<Value>,
    pub current_round: CurrentRound,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentRound {
    pub target_amount: Option<Value>,
    pub target_close_date: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FounderAndTeam {
    pub founders: Vec<Founder>,
    pub execution: Execution,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Founder {
    pub name: Option<String>,
    pub role: Option<String>,
    pub ownership_percentage: Option<Value>,
    pub prior_experience: Option<String>,
    pub years_direct_experience: Option<Value>,
    pub founder_market_fit_statement: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Execution {
    pub full_time_start_date: Option<String>,
    pub key_shipments: Vec<Shipment>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shipment {
    pub date: Option<String>,
    pub item: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemDefinition {
    pub customer_profile: CustomerProfile,
    pub problem_statement: Option<String>,
    pub current_solution: Option<String>,
    pub gap_analysis: Option<String>,
    pub frequency: Option<String>,
    pub impact_metrics: ImpactMetrics,
    pub evidence: ProblemEvidence,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerProfile {
    pub role: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactMetrics {
    pub cost_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemEvidence {
    pub interviews_conducted: Option<Value>,
    pub customer_quotes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductAndSolution {
    pub product_stage: Option<String>,
    pub demo_link: Option<String>,
    pub core_stickiness: Option<String>,
    pub differentiation: Option<String>,
    pub defensibility_moat: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketAndScope {
    pub beachhead_market: Option<String>,
    pub market_size_estimate: Option<Value>,
    pub long_term_vision: Option<String>,
    pub expansion_strategy: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TractionMetrics {
    pub stage_context: Option<String>,
    pub user_count: Option<Value>,
    pub active_users_monthly: Option<Value>,
    pub partnerships_and_lois: Option<Value>,
    pub early_revenue: Option<Value>,
    pub growth_rate: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GtmStrategy {
    pub buyer_persona: Option<String>,
    pub user_persona: Option<String>,
    pub primary_acquisition_channel: Option<String>,
    pub sales_motion: Option<String>,
    pub average_sales_cycle: Option<String>,
    pub deal_closer: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessModel {
    pub pricing_model: Option<String>,
    pub average_price_per_customer: Option<Value>,
    pub gross_margin: Option<Value>,
    pub monthly_burn: Option<Value>,
    pub runway_months: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionAndStrategy {
    pub five_year_vision: Option<String>,
    pub category_definition: Option<String>,
    pub primary_risk: Option<String>,
    pub use_of_funds: Vec<Value>,
}

impl StartupProfile {
    /// Accepts the document with or without the `startup_evaluation` wrapper.
    pub fn from_value(value: &Value) -> Result<Self> {
        let root = value.get("startup_evaluation").unwrap_or(value);
        if !root.is_object() {
            return Err(Error::InvalidInput(
                "startup profile must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(root.clone())
            .map_err(|e| Error::InvalidInput(format!("startup profile: {e}")))
    }

    /// Lenient variant for graph nodes: malformed sections become defaults.
    pub fn from_value_lossy(value: &Value) -> Self {
        Self::from_value(value).unwrap_or_default()
    }

    pub fn company_name(&self) -> &str {
        self.company_snapshot
            .company_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("the company")
    }

    pub fn website_url(&self) -> Option<&str> {
        self.company_snapshot
            .website_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Sub-view of the profile relevant to one dimension.
    pub fn view(&self, dimension: Dimension) -> Value {
        let snapshot = &self.company_snapshot;
        match dimension {
            Dimension::Team => json!({
                "company_name": snapshot.company_name,
                "date_founded": snapshot.date_founded,
                "current_stage": snapshot.current_stage,
                "founders": self.founder_and_team.founders,
                "execution": self.founder_and_team.execution,
            }),
            Dimension::Problem => json!({
                "company_name": snapshot.company_name,
                "problem_definition": self.problem_definition,
            }),
            Dimension::Product => json!({
                "company_name": snapshot.company_name,
                "website_url": snapshot.website_url,
                "product_and_solution": self.product_and_solution,
                "problem_statement": self.problem_definition.problem_statement,
            }),
            Dimension::Market => json!({
                "company_name": snapshot.company_name,
                "hq_location": snapshot.hq_location,
                "customer_profile": self.problem_definition.customer_profile,
                "market_and_scope": self.market_and_scope,
            }),
            Dimension::Traction => json!({
                "current_stage": snapshot.current_stage,
                "date_founded": snapshot.date_founded,
                "product_stage": self.product_and_solution.product_stage,
                "traction_metrics": self.traction_metrics,
            }),
            Dimension::Gtm => json!({
                "customer_profile": self.problem_definition.customer_profile,
                "gtm_strategy": self.gtm_strategy,
                "pricing_model": self.business_model.pricing_model,
            }),
            Dimension::Business => json!({
                "current_stage": snapshot.current_stage,
                "amount_raised_to_date": snapshot.amount_raised_to_date,
                "current_round": snapshot.current_round,
                "business_model": self.business_model,
                "early_revenue": self.traction_metrics.early_revenue,
            }),
            Dimension::Vision => json!({
                "long_term_vision": self.market_and_scope.long_term_vision,
                "expansion_strategy": self.market_and_scope.expansion_strategy,
                "vision_and_strategy": self.vision_and_strategy,
            }),
            Dimension::Operations => json!({
                "founders": self
                    .founder_and_team
                    .founders
                    .iter()
                    .map(|f| json!({ "name": f.name, "role": f.role }))
                    .collect::<Vec<_>>(),
                "execution": self.founder_and_team.execution,
                "monthly_burn": self.business_model.monthly_burn,
                "runway_months": self.business_model.runway_months,
                "use_of_funds": self.vision_and_strategy.use_of_funds,
            }),
        }
    }
}

/// The nine scored aspects of a startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Team,
    Problem,
    Product,
    Market,
    Traction,
    Gtm,
    Business,
    Vision,
    Operations,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::Team,
        Dimension::Problem,
        Dimension::Product,
        Dimension::Market,
        Dimension::Traction,
        Dimension::Gtm,
        Dimension::Business,
        Dimension::Vision,
        Dimension::Operations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Team => "team",
            Dimension::Problem => "problem",
            Dimension::Product => "product",
            Dimension::Market => "market",
            Dimension::Traction => "traction",
            Dimension::Gtm => "gtm",
            Dimension::Business => "business",
            Dimension::Vision => "vision",
            Dimension::Operations => "operations",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Team => "Team",
            Dimension::Problem => "Problem",
            Dimension::Product => "Product",
            Dimension::Market => "Market",
            Dimension::Traction => "Traction",
            Dimension::Gtm => "Go-to-market",
            Dimension::Business => "Business model",
            Dimension::Vision => "Vision",
            Dimension::Operations => "Operations",
        }
    }

    /// What a 5 looks like versus a 1, handed to the scoring model.
    pub fn rubric(self) -> &'static str {
        match self {
            Dimension::Team => "5: founders with deep direct experience in this market, complementary roles, full-time, shipping steadily. 1: no relevant experience, part-time, nothing shipped.",
            Dimension::Problem => "5: frequent, costly problem backed by many interviews and independent online complaints. 1: hypothetical problem with no evidence.",
            Dimension::Product => "5: live product with clear differentiation, stickiness and a defensible moat. 1: concept only, indistinguishable from existing tools.",
            Dimension::Market => "5: large, well-defined beachhead with a credible path to expand. 1: vague or tiny market, no beachhead.",
            Dimension::Traction => "5: paying users growing fast relative to stage, signed LOIs or partnerships. 1: no users or revenue.",
            Dimension::Gtm => "5: clear buyer, proven repeatable acquisition channel, short sales cycle. 1: no idea who buys or how to reach them.",
            Dimension::Business => "5: healthy margins, pricing matched to value, more than 18 months runway. 1: no pricing, burning with little runway.",
            Dimension::Vision => "5: ambitious, coherent category-defining vision with a named primary risk and disciplined use of funds. 1: no vision beyond the first product.",
            Dimension::Operations => "5: clear ownership of every function, consistent delivery cadence, burn under control. 1: unclear roles and no execution record.",
        }
    }

    pub fn report_key(self) -> &'static str {
        match self {
            Dimension::Team => "team_report",
            Dimension::Problem => "problem_report",
            Dimension::Product => "product_report",
            Dimension::Market => "market_report",
            Dimension::Traction => "traction_report",
            Dimension::Gtm => "gtm_report",
            Dimension::Business => "business_report",
            Dimension::Vision => "vision_report",
            Dimension::Operations => "operations_report",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dotted paths of every null, blank, or empty value in `value`.
///
/// Array elements use their index as the path segment
/// (`founder_and_team.founders.0.name`).
pub fn missing_fields(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk_missing(value, "", &mut out);
    out
}

fn walk_missing(value: &Value, path: &str, out: &mut Vec<String>) {
    let join = |segment: &str| {
        if path.is_empty() {
            segment.to_string()
        } else {
            format!("{path}.{segment}")
        }
    };
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                walk_missing(child, &join(key), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (idx, child) in items.iter().enumerate() {
                walk_missing(child, &join(&idx.to_string()), out);
            }
        }
        Value::Null => push_path(path, out),
        Value::String(s) if s.trim().is_empty() => push_path(path, out),
        Value::Object(_) | Value::Array(_) => push_path(path, out),
        _ => {}
    }
}

fn push_path(path: &str, out: &mut Vec<String>) {
    if !path.is_empty() {
        out.push(path.to_string());
    }
}

/// The `startup_evaluation` body if wrapped, else the value itself.
pub fn profile_root(value: &Value) -> &Value {
    value.get("startup_evaluation").unwrap_or(value)
}

/// True when the profile carries no usable content at all.
pub fn is_blank(value: &Value) -> bool {
    match profile_root(value) {
        Value::Null => true,
        Value::Object(map) => map.values().all(is_blank_value),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank_value),
        Value::Object(map) => map.values().all(is_blank_value),
        _ => false,
    }
}

/// Render a projection for a prompt, dropping nulls so models are not told
/// about fields that were never filled.
pub fn compact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), compact(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(compact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
pub(crate) fn sample_profile() -> Value {
    json!({
        "startup_evaluation": {
            "meta_data": { "form_type": "pre-seed", "last_updated": "2024-05-01" },
            "company_snapshot": {
                "company_name": "FleetFix",
                "website_url": "https://fleetfix.io",
                "hq_location": "Dubai, UAE",
                "date_founded": "2023-02-01",
                "current_stage": "Pre-Seed",
                "amount_raised_to_date": 150000,
                "current_round": { "target_amount": "$1.5M", "target_close_date": "2024-12-01" }
            },
            "founder_and_team": {
                "founders": [{
                    "name": "Lina Haddad",
                    "role": "CEO",
                    "ownership_percentage": 60,
                    "prior_experience": "Ops lead at a logistics company",
                    "years_direct_experience": 7,
                    "founder_market_fit_statement": "Ran a 400-truck fleet"
                }],
                "execution": {
                    "full_time_start_date": "2023-03-01",
                    "key_shipments": [{ "date": "2023-09-01", "item": "MVP" }]
                }
            },
            "problem_definition": {
                "customer_profile": { "role": "Fleet manager", "company_size": "50-500", "industry": "Logistics" },
                "problem_statement": "Unplanned truck breakdowns cost fleets days of revenue",
                "current_solution": "Spreadsheets and phone calls",
                "gap_analysis": "",
                "frequency": "High",
                "impact_metrics": { "cost_type": "Revenue loss", "description": "$2k per day per truck" },
                "evidence": { "interviews_conducted": 25, "customer_quotes": ["We lose a truck a week"] }
            },
            "product_and_solution": {
                "product_stage": "MVP",
                "demo_link": null,
                "core_stickiness": "Daily maintenance schedule",
                "differentiation": "Predictive alerts from telematics",
                "defensibility_moat": "Failure dataset"
            },
            "market_and_scope": {
                "beachhead_market": "GCC mid-size fleets",
                "market_size_estimate": "$2B",
                "long_term_vision": "Operating system for fleet maintenance",
                "expansion_strategy": "Expand to MENA then Europe"
            },
            "traction_metrics": {
                "stage_context": "Pilots",
                "user_count": 12,
                "active_users_monthly": 9,
                "partnerships_and_lois": 3,
                "early_revenue": "$4k MRR",
                "growth_rate": "20% MoM"
            },
            "gtm_strategy": {
                "buyer_persona": "Head of operations",
                "user_persona": "Fleet manager",
                "primary_acquisition_channel": "Direct sales",
                "sales_motion": "Founder-led",
                "average_sales_cycle": "6 weeks",
                "deal_closer": "CEO"
            },
            "business_model": {
                "pricing_model": "Per truck per month",
                "average_price_per_customer": 1200,
                "gross_margin": "75%",
                "monthly_burn": 25000,
                "runway_months": 8
            },
            "vision_and_strategy": {
                "five_year_vision": "Every fleet in MENA runs on FleetFix",
                "category_definition": "Predictive fleet maintenance",
                "primary_risk": "Telematics integrations",
                "use_of_funds": ["Engineering", "Sales"]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_and_bare_profiles() {
        let wrapped = sample_profile();
        let profile = StartupProfile::from_value(&wrapped).unwrap();
        assert_eq!(profile.company_name(), "FleetFix");
        assert_eq!(profile.founder_and_team.founders.len(), 1);
        let bare = StartupProfile::from_value(&wrapped["startup_evaluation"]).unwrap();
        assert_eq!(bare, profile);
        assert!(StartupProfile::from_value(&json!("text")).is_err());
    }

    #[test]
    fn missing_fields_reports_dotted_paths() {
        let paths = missing_fields(&sample_profile());
        assert_eq!(
            paths,
            vec![
                "startup_evaluation.problem_definition.gap_analysis",
                "startup_evaluation.product_and_solution.demo_link",
            ]
        );
        let nested = json!({ "a": { "b": [], "c": [null, "x"] }, "d": {} });
        assert_eq!(missing_fields(&nested), vec!["a.b", "a.c.0", "d"]);
    }

    #[test]
    fn views_are_scoped_to_their_dimension() {
        let profile = StartupProfile::from_value(&sample_profile()).unwrap();
        let team = profile.view(Dimension::Team);
        assert_eq!(team["founders"][0]["name"], "Lina Haddad");
        assert!(team.get("business_model").is_none());
        let ops = profile.view(Dimension::Operations);
        assert_eq!(ops["runway_months"], 8);
        assert_eq!(ops["founders"][0], json!({ "name": "Lina Haddad", "role": "CEO" }));
        for dim in Dimension::ALL {
            assert!(profile.view(dim).is_object(), "{dim}");
        }
    }

    #[test]
    fn blank_profiles_are_detected() {
        assert!(is_blank(&json!({})));
        assert!(is_blank(&json!({ "startup_evaluation": { "company_snapshot": { "company_name": " " } } })));
        assert!(!is_blank(&sample_profile()));
        assert_eq!(compact(&json!({ "a": null, "b": 1 })), json!({ "b": 1 }));
    }
}
