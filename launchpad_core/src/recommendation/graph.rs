//! insights ∥ patterns → refine → report → write.
//!
//! Insights and pattern matching are pure and run side by side. The
//! statement improver is best-effort; the report writer is not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use launchpad_graph::error::{GraphError, Result};
use launchpad_graph::{CompiledGraph, GraphBuilder, Node, NodeSpec, START};

use super::insights::Insights;
use super::patterns::{match_patterns, MatchedPattern, ScoreCard};
use super::writer::{write_report, ReportPaths};
use crate::agents::{Agents, CallOptions, Role};
use crate::profile::StartupProfile;
use crate::prompts::Prompt;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinedStatement {
    pub original: String,
    pub recommended: String,
    pub why_better: String,
}

pub type RefinedStatements = BTreeMap<String, RefinedStatement>;

launchpad_graph::state_record! {
    pub struct RecommendationState {
        request_id: String,
        raw_input: Value,
        eval_output: ScoreCard,
        insights: Insights,
        matched_patterns: Vec<MatchedPattern>,
        refined_statements: RefinedStatements,
        final_report: String,
        output_paths: ReportPaths,
    }
}

struct ExtractInsights;

#[async_trait]
impl Node<RecommendationState> for ExtractInsights {
    async fn run(&self, state: &RecommendationState) -> Result<RecommendationState> {
        let raw = state.raw_input.clone().unwrap_or(Value::Null);
        let profile = StartupProfile::from_value_lossy(&raw);
        Ok(RecommendationState {
            insights: Some(Insights::extract(&profile)),
            ..RecommendationState::default()
        })
    }
}

struct MatchPatterns;

#[async_trait]
impl Node<RecommendationState> for MatchPatterns {
    async fn run(&self, state: &RecommendationState) -> Result<RecommendationState> {
        let scores = state.eval_output.unwrap_or_default();
        let matched = match_patterns(&scores);
        tracing::info!(matched = matched.len(), "failure patterns matched");
        Ok(RecommendationState {
            matched_patterns: Some(matched),
            ..RecommendationState::default()
        })
    }
}

/// Keeps only well-formed entries of the improver's answer.
pub fn parse_refined(value: &Value) -> RefinedStatements {
    let Some(map) = value.as_object() else {
        return RefinedStatements::new();
    };
    map.iter()
        .filter_map(|(kind, entry)| {
            let statement: RefinedStatement = serde_json::from_value(entry.clone()).ok()?;
            (!statement.recommended.trim().is_empty()).then(|| (kind.clone(), statement))
        })
        .collect()
}

/// Rewrite the founder's statements. `None` means refinement was skipped.
pub async fn improve_statements(
    agents: &Agents,
    insights: &Insights,
    scores: &ScoreCard,
) -> Result<Option<RefinedStatements>> {
    let statements = insights.statements();
    if statements.is_empty() {
        return Ok(None);
    }
    let inputs = json!({ "statements": statements, "scores": scores.as_map() });
    match agents
        .run_structured::<Value>(Role::Writer, Prompt::StatementImprover, &inputs, CallOptions::default())
        .await
    {
        Ok(value) => Ok(Some(parse_refined(&value))),
        Err(err) if err.is_quota_exceeded() => {
            tracing::warn!(error = %err, "statement improver over quota; skipping refinement");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

struct Refine {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<RecommendationState> for Refine {
    async fn run(&self, state: &RecommendationState) -> Result<RecommendationState> {
        let insights = state.insights.clone().unwrap_or_default();
        let scores = state.eval_output.unwrap_or_default();
        let refined = match improve_statements(&self.agents, &insights, &scores).await {
            Ok(refined) => refined,
            Err(err) => {
                tracing::warn!(error = %err, "statement refinement failed");
                None
            }
        };
        Ok(RecommendationState {
            refined_statements: refined,
            ..RecommendationState::default()
        })
    }
}

struct Report {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<RecommendationState> for Report {
    async fn run(&self, state: &RecommendationState) -> Result<RecommendationState> {
        let inputs = json!({
            "insights": state.insights.clone().unwrap_or_default(),
            "scores": state.eval_output.unwrap_or_default().as_map(),
            "patterns": state.matched_patterns.clone().unwrap_or_default(),
            "refined": state.refined_statements.clone(),
        });
        let text = self
            .agents
            .run_prompt(
                Role::Writer,
                Prompt::RecommendationReport,
                &inputs,
                CallOptions::text().with_fallback(),
            )
            .await?;
        let report = text.trim().to_string();
        if report.is_empty() {
            return Err(GraphError::internal("report writer returned an empty report"));
        }
        Ok(RecommendationState {
            final_report: Some(report),
            ..RecommendationState::default()
        })
    }
}

struct WriteReport {
    output_dir: PathBuf,
}

#[async_trait]
impl Node<RecommendationState> for WriteReport {
    async fn run(&self, state: &RecommendationState) -> Result<RecommendationState> {
        let paths = write_report(&self.output_dir, state)
            .await
            .map_err(|err| GraphError::internal(format!("write recommendation: {err}")))?;
        tracing::info!(dir = %paths.dir.display(), "recommendation written");
        Ok(RecommendationState {
            output_paths: Some(paths),
            ..RecommendationState::default()
        })
    }
}

pub fn build_graph(agents: Arc<Agents>, output_dir: PathBuf) -> Result<CompiledGraph<RecommendationState>> {
    GraphBuilder::new("recommendation")
        .add_node(NodeSpec::new("insights", ExtractInsights).reads(&["raw_input"]).writes(&["insights"]))
        .add_node(
            NodeSpec::new("patterns", MatchPatterns)
                .reads(&["eval_output"])
                .writes(&["matched_patterns"]),
        )
        .add_node(
            NodeSpec::new("refine", Refine { agents: agents.clone() })
                .reads(&["insights", "eval_output"])
                .writes(&["refined_statements"]),
        )
        .add_node(
            NodeSpec::new("report", Report { agents })
                .reads(&["insights", "eval_output", "matched_patterns", "refined_statements"])
                .writes(&["final_report"]),
        )
        .add_node(
            NodeSpec::new("write", WriteReport { output_dir })
                .reads(&[
                    "request_id",
                    "insights",
                    "eval_output",
                    "matched_patterns",
                    "refined_statements",
                    "final_report",
                ])
                .writes(&["output_paths"]),
        )
        .add_fan_out(START, &["insights", "patterns"])
        .add_edge("insights", "refine")
        .add_fan_in(&["refine", "patterns"], "report")
        .add_edge("report", "write")
        .compile()
}
