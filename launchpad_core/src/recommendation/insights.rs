//! Facts pulled from the founder's own profile that the report quotes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::profile::StartupProfile;

const MAX_QUOTES: usize = 3;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub company_name: String,
    pub stage: Option<String>,
    pub target_raise: Option<String>,
    pub problem_statement: Option<String>,
    pub founder_experience: Vec<String>,
    pub customer_quotes: Vec<String>,
    pub differentiation: Option<String>,
    pub traction: Option<String>,
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn scalar(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

impl Insights {
    pub fn extract(profile: &StartupProfile) -> Self {
        let snapshot = &profile.company_snapshot;
        let founder_experience = profile
            .founder_and_team
            .founders
            .iter()
            .filter_map(|f| {
                let name = text(&f.name).unwrap_or_else(|| "Founder".to_string());
                let mut parts = Vec::new();
                if let Some(role) = text(&f.role) {
                    parts.push(role);
                }
                if let Some(experience) = text(&f.prior_experience) {
                    parts.push(experience);
                }
                if let Some(years) = scalar(&f.years_direct_experience) {
                    parts.push(format!("{years} years direct experience"));
                }
                (!parts.is_empty()).then(|| format!("{name}: {}", parts.join("; ")))
            })
            .collect();

        let metrics = &profile.traction_metrics;
        let traction: Vec<String> = [
            ("users", scalar(&metrics.user_count)),
            ("monthly active", scalar(&metrics.active_users_monthly)),
            ("partnerships/LOIs", scalar(&metrics.partnerships_and_lois)),
            ("revenue", scalar(&metrics.early_revenue)),
            ("growth", scalar(&metrics.growth_rate)),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| format!("{label}: {v}")))
        .collect();

        Self {
            company_name: profile.company_name().to_string(),
            stage: text(&snapshot.current_stage),
            target_raise: scalar(&snapshot.current_round.target_amount),
            problem_statement: text(&profile.problem_definition.problem_statement),
            founder_experience,
            customer_quotes: profile
                .problem_definition
                .evidence
                .customer_quotes
                .iter()
                .map(|q| q.trim())
                .filter(|q| !q.is_empty())
                .take(MAX_QUOTES)
                .map(str::to_string)
                .collect(),
            differentiation: text(&profile.product_and_solution.differentiation),
            traction: (!traction.is_empty()).then(|| traction.join(", ")),
        }
    }

    /// Statements the improver rewrites, keyed by kind. Kinds without a
    /// founder-supplied original are left out.
    pub fn statements(&self) -> serde_json::Map<String, Value> {
        [
            ("problem_statement", self.problem_statement.clone()),
            ("differentiation", self.differentiation.clone()),
            ("traction", self.traction.clone()),
            ("founder_market_fit", self.founder_experience.first().cloned()),
        ]
        .into_iter()
        .filter_map(|(kind, value)| value.map(|v| (kind.to_string(), Value::String(v))))
        .collect()
    }
}
