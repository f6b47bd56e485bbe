//! Startup evaluation: a planner fans out to nine dimension branches whose
//! reports a synthesis node folds into an investment memo.

pub mod checks;
pub mod graph;
pub mod model;
pub mod scoring;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use graph::{build_graph, EvaluationState};
pub use model::{CheckReport, DimensionReport, Memo, Plan, SearchResults};
pub use scoring::overall_score;

use crate::profile::{missing_fields, profile_root, Dimension, StartupProfile};
use crate::services::Services;
use crate::tools::tech_stack::TechStackReport;
use crate::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub company_name: String,
    pub plan: Plan,
    pub reports: BTreeMap<Dimension, DimensionReport>,
    pub overall_score: f64,
    pub final_memo: Memo,
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub tech_stack: Option<TechStackReport>,
    #[serde(default)]
    pub visual_analysis: Option<String>,
}

impl EvaluationReport {
    /// Always nine reports; nodes that never committed read as system errors.
    pub fn from_state(state: &EvaluationState) -> Self {
        let user_data = state.user_data.clone().unwrap_or(Value::Null);
        let reports = state.reports();
        let final_memo = state
            .final_memo
            .clone()
            .unwrap_or_else(|| scoring::fallback_memo(&reports));
        Self {
            company_name: StartupProfile::from_value_lossy(&user_data).company_name().to_string(),
            plan: state.plan.clone().unwrap_or_else(Plan::failed),
            overall_score: overall_score(&reports),
            reports,
            final_memo,
            missing_fields: missing_fields(profile_root(&user_data)),
            tech_stack: state.tech_stack.clone(),
            visual_analysis: state.visual_analysis.clone(),
        }
    }
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn evaluate_startup(services: &Services, user_data: Value) -> Result<EvaluationReport> {
    if !user_data.is_object() {
        return Err(Error::InvalidInput("startup profile must be a JSON object".to_string()));
    }
    let graph = build_graph(services)?;
    let run = graph
        .invoke(EvaluationState {
            user_data: Some(user_data),
            ..EvaluationState::default()
        })
        .await?;
    for (node, err) in run.failures() {
        tracing::warn!(node, error = %err, "evaluation node failed");
    }
    let report = EvaluationReport::from_state(&run.state);
    tracing::info!(
        company = %report.company_name,
        overall = report.overall_score,
        "evaluation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::sample_profile;
    use crate::test_support::{hit, services_with, FakeSearch, ScriptedLlm};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_profile_fails_the_plan_and_scores_zero() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new();
        let services = services_with(llm.clone(), dir.path());
        let report = evaluate_startup(&services, json!({})).await.unwrap();

        assert!(report.plan.is_failed());
        assert_eq!(report.reports.len(), 9);
        assert!(report.reports.values().all(|r| r.score == 0));
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.final_memo.action_plan.len(), 3);
        assert_eq!(report.visual_analysis.as_deref(), Some("website offline"));
        assert_eq!(report.tech_stack.unwrap().verdict, "No URL");
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn full_run_scores_every_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new()
            .reply("planning analyst", r#"{"steps": ["Check traction"], "key_risks": ["Thin data"]}"#)
            .reply("forensic diligence reviewer", "No contradictions found.")
            .reply("skeptical early-stage investor", "- Pilot-only revenue")
            .reply(
                "validate whether a customer problem is real",
                r#"{"technical_pain": "truck telematics failure prediction", "human_symptom": "truck broke down again", "competitor_solutions": "fleet maintenance software"}"#,
            )
            .reply(
                "venture scoring model",
                r#"```json
{"score": 4, "description": "Credible", "red_flags": [], "explanation": "Backed by pilots"}
```"#,
            )
            .reply(
                "final investment memo",
                r#"{"executive_summary": "Worth a partner meeting", "insights": {}, "action_plan": ["Convert pilots", "Hire sales", "Raise seed"]}"#,
            );
        let mut services = services_with(llm.clone(), dir.path());
        services.search = Arc::new(
            FakeSearch::new().with("broke down", vec![hit("Fleet forum", "third breakdown", "https://forum.example")]),
        );

        let report = evaluate_startup(&services, sample_profile()).await.unwrap();
        assert_eq!(report.company_name, "FleetFix");
        assert_eq!(report.plan.steps, vec!["Check traction"]);
        assert_eq!(report.reports.len(), 9);
        assert!(report.reports.values().all(|r| (0..=5).contains(&r.score)));
        assert_eq!(report.reports[&Dimension::Team].score, 4);
        assert_eq!(report.reports[&Dimension::Problem].score, 4);
        assert_eq!(report.final_memo.executive_summary, "Worth a partner meeting");
        assert_eq!(report.final_memo.insights.len(), 9);
        assert_eq!(llm.calls_matching("planning analyst"), 1);

        let problem_prompt = llm
            .requests()
            .iter()
            .map(crate::test_support::request_text)
            .find(|t| t.contains("venture scoring model") && t.contains("third breakdown"));
        assert!(problem_prompt.is_some());
    }

    #[tokio::test]
    async fn scoring_outage_degrades_to_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(ScriptedLlm::new(), dir.path());
        let report = evaluate_startup(&services, sample_profile()).await.unwrap();
        assert_eq!(report.reports.len(), 9);
        assert!(report.plan.is_failed());
        assert!(report
            .reports
            .values()
            .all(|r| r.score == 0 && r.description == "system error"));
        assert!(report.final_memo.executive_summary.starts_with("No dimension"));
    }

    #[tokio::test]
    async fn rejects_non_object_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(ScriptedLlm::new(), dir.path());
        let err = evaluate_startup(&services, json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn from_state_fills_missing_reports() {
        let state = EvaluationState {
            user_data: Some(json!({ "startup_evaluation": { "company_snapshot": { "company_name": "Acme" } } })),
            ..EvaluationState::default()
        };
        let report = EvaluationReport::from_state(&state);
        assert_eq!(report.company_name, "Acme");
        assert_eq!(report.reports.len(), 9);
        assert!(report.reports.values().all(|r| r.description == "system error"));
        assert!(report.plan.is_failed());
    }
}
