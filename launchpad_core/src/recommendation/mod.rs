//! Recommendation report: deterministic failure-pattern matching over the
//! evaluation scores, then a model-written action plan.

pub mod graph;
pub mod insights;
pub mod patterns;
pub mod writer;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use graph::{build_graph, RecommendationState, RefinedStatement, RefinedStatements};
pub use insights::Insights;
pub use patterns::{match_patterns, Category, MatchedPattern, ScoreCard, Severity, StrengthLabel, CATALOG};
pub use writer::ReportPaths;

use crate::services::Services;
use crate::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendationOutcome {
    pub request_id: String,
    pub scores: ScoreCard,
    pub insights: Insights,
    pub matched_patterns: Vec<MatchedPattern>,
    pub refined_statements: Option<RefinedStatements>,
    pub report: String,
    pub paths: ReportPaths,
}

#[tracing::instrument(level = "info", skip(services, raw_input, eval_output))]
pub async fn run_recommendation(
    services: &Services,
    raw_input: Value,
    eval_output: &Value,
    request_id: Option<String>,
) -> Result<RecommendationOutcome> {
    if !raw_input.is_object() {
        return Err(Error::InvalidInput("raw_input must be a JSON object".to_string()));
    }
    let scores = ScoreCard::from_evaluation(eval_output);
    if scores.is_empty() {
        tracing::warn!("evaluation carries no scores; every dimension treated as unjudged");
    }
    let request_id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let graph = build_graph(services.agents.clone(), services.output_dir.clone())?;
    let run = graph
        .invoke(RecommendationState {
            request_id: Some(request_id.clone()),
            raw_input: Some(raw_input),
            eval_output: Some(scores),
            ..RecommendationState::default()
        })
        .await?;

    if let Some((node, err)) = run.failures().first() {
        tracing::warn!(node, error = %err, "recommendation failed");
        return Err((*err).clone().into());
    }
    let state = run.state;
    let (Some(report), Some(paths)) = (state.final_report, state.output_paths) else {
        return Err(Error::BackendMessage("recommendation produced no report".to_string()));
    };
    Ok(RecommendationOutcome {
        request_id,
        scores,
        insights: state.insights.unwrap_or_default(),
        matched_patterns: state.matched_patterns.unwrap_or_default(),
        refined_statements: state.refined_statements,
        report,
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::sample_profile;
    use crate::test_support::{services_with, ScriptedLlm};
    use launchpad_graph::ProviderErrorKind;
    use serde_json::json;

    const REPORT: &str = "## Core Hypothesis\nFleets pay to avoid downtime.\n## Kill Signal\nNo renewals.";

    fn evaluation() -> Value {
        json!({ "reports": {
            "team": { "score": 4 }, "problem": { "score": 4 }, "product": { "score": 3 },
            "market": { "score": 4 }, "traction": { "score": 2 }, "gtm": { "score": 2 },
            "business": { "score": 3 }, "vision": { "score": 4 }, "operations": { "score": 3 }
        }})
    }

    #[tokio::test]
    async fn end_to_end_writes_a_numbered_report() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new()
            .reply(
                "pitch coach",
                r#"{"problem_statement": {"original": "x", "recommended": "Fleets lose $2k per truck-day", "why_better": "quantified"}}"#,
            )
            .reply("startup advisor", REPORT);
        let services = services_with(llm.clone(), dir.path());
        let outcome = run_recommendation(&services, sample_profile(), &evaluation(), Some("r1".into()))
            .await
            .unwrap();

        assert_eq!(outcome.scores.traction, 2);
        assert_eq!(outcome.insights.company_name, "FleetFix");
        assert!(outcome.matched_patterns.iter().any(|m| m.pattern_id == "no-traction"));
        assert_eq!(outcome.refined_statements.unwrap().len(), 1);
        assert_eq!(outcome.paths.number, 1);
        assert_eq!(std::fs::read_to_string(&outcome.paths.markdown).unwrap(), REPORT);
        let prompt = llm.requests().last().map(crate::test_support::request_text).unwrap();
        assert!(prompt.contains("no-traction"));
    }

    #[tokio::test]
    async fn improver_quota_still_produces_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new()
            .fail("pitch coach", ProviderErrorKind::QuotaExceeded)
            .reply("startup advisor", REPORT);
        let services = services_with(llm, dir.path());
        let outcome = run_recommendation(&services, sample_profile(), &evaluation(), None)
            .await
            .unwrap();
        assert!(outcome.refined_statements.is_none());
        assert!(!outcome.request_id.is_empty());
    }

    #[tokio::test]
    async fn writer_quota_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new()
            .reply("pitch coach", "{}")
            .fail("startup advisor", ProviderErrorKind::QuotaExceeded);
        let services = services_with(llm, dir.path());
        let err = run_recommendation(&services, sample_profile(), &evaluation(), None)
            .await
            .unwrap_err();
        match err {
            Error::QuotaExceeded(message) => assert!(message.contains("retry")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("recommendations").exists());
    }

    #[tokio::test]
    async fn rejects_non_object_input() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(ScriptedLlm::new(), dir.path());
        let err = run_recommendation(&services, json!("x"), &evaluation(), None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
