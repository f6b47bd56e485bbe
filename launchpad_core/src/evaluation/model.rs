//! Records the evaluation graph passes between nodes.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::lenient::{bullets, score_0_5, text_of, text_or_empty};
use crate::profile::Dimension;
use crate::tools::search::SearchHit;

pub const NONE_TEXT: &str = "None";
pub const PLANNING_FAILED: &str = "Planning Failed";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, deserialize_with = "bullets")]
    pub steps: Vec<String>,
    #[serde(default, deserialize_with = "bullets")]
    pub key_risks: Vec<String>,
    #[serde(default, deserialize_with = "bullets")]
    pub desired_output_structure: Vec<String>,
}

impl Plan {
    pub fn failed() -> Self {
        Self {
            key_risks: vec![PLANNING_FAILED.to_string()],
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.steps.is_empty() && self.key_risks.iter().any(|r| r == PLANNING_FAILED)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionReport {
    #[serde(default, deserialize_with = "score_0_5")]
    pub score: u8,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "bullets")]
    pub red_flags: Vec<String>,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub explanation: String,
}

impl DimensionReport {
    /// Stand-in for a scoring call that failed.
    pub fn system_error(error: impl ToString) -> Self {
        Self {
            score: 0,
            description: "system error".to_string(),
            red_flags: vec![error.to_string()],
            explanation: String::new(),
        }
    }

    pub fn insufficient_data(missing: &[String]) -> Self {
        Self {
            score: 0,
            description: "insufficient data".to_string(),
            red_flags: Vec::new(),
            explanation: if missing.is_empty() {
                "No data was provided for this dimension.".to_string()
            } else {
                format!("Missing fields: {}", missing.join(", "))
            },
        }
    }
}

/// Contradiction and risk reviews of one dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub contradiction: String,
    pub risk: String,
}

impl Default for CheckReport {
    fn default() -> Self {
        Self {
            contradiction: NONE_TEXT.to_string(),
            risk: NONE_TEXT.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PainQueries {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub technical_pain: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub human_symptom: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub competitor_solutions: String,
}

impl PainQueries {
    /// Queries derived from the problem text alone.
    pub fn from_problem(problem: &str) -> Self {
        let problem = problem.trim();
        Self {
            technical_pain: format!("{problem} technical challenges"),
            human_symptom: format!("{problem} frustrating forum"),
            competitor_solutions: format!("{problem} software tools alternatives"),
        }
    }

    pub fn is_complete(&self) -> bool {
        [&self.technical_pain, &self.human_symptom, &self.competitor_solutions]
            .iter()
            .all(|q| !q.trim().is_empty())
    }

    pub fn labelled(&self) -> [(&'static str, &str); 3] {
        [
            ("technical_pain", &self.technical_pain),
            ("human_symptom", &self.human_symptom),
            ("competitor_solutions", &self.competitor_solutions),
        ]
    }
}

/// Web evidence gathered for the problem (or, narrower, for the product's
/// competitors).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub queries: BTreeMap<String, String>,
    pub hits: BTreeMap<String, Vec<SearchHit>>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.hits.values().all(Vec::is_empty)
    }

    pub fn all_hits(&self) -> Vec<SearchHit> {
        self.hits.values().flatten().cloned().collect()
    }

    /// Prompt text: one block per query kind.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return NONE_TEXT.to_string();
        }
        self.hits
            .iter()
            .filter(|(_, hits)| !hits.is_empty())
            .map(|(kind, hits)| {
                let query = self.queries.get(kind).map(String::as_str).unwrap_or_default();
                format!(
                    "[{kind}] {query}\n{}",
                    crate::tools::search::format_hits(hits)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub executive_summary: String,
    #[serde(default, deserialize_with = "dimension_lines")]
    pub insights: BTreeMap<Dimension, String>,
    #[serde(default, deserialize_with = "bullets")]
    pub action_plan: Vec<String>,
}

/// Keeps the entries whose key names a dimension.
fn dimension_lines<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<Dimension, String>, D::Error> {
    let Value::Object(map) = Value::deserialize(d)? else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .iter()
        .filter_map(|(key, line)| {
            let dimension = Dimension::ALL.into_iter().find(|d| d.as_str() == key.trim().to_ascii_lowercase())?;
            let line = text_of(line).filter(|l| !l.is_empty())?;
            Some((dimension, line))
        })
        .collect())
}
