//! Evaluation DAG.
//!
//! ```text
//! planner ─┬─ <dim>_checks ─ <dim>_scoring ───────────────┐   (7 generic dimensions)
//!          ├─ problem_checks ─ problem_scoring ────────────┤
//!          ├─ tech_stack ─────────┐                        ├─ synthesis
//!          ├─ visual_analysis ────┼─ product_scoring ──────┘
//!          └─ product_contradiction┘
//! ```
//!
//! Every node degrades instead of failing, so a run always ends with nine
//! reports and a memo.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use launchpad_graph::error::Result;
use launchpad_graph::{CompiledGraph, GraphBuilder, Node, NodeSpec, START};

use super::checks::{
    competitor_search, contradiction_check, or_none, pain_queries, pain_search, risk_check, run_checks,
    visual_analysis,
};
use super::model::{CheckReport, DimensionReport, Memo, Plan, SearchResults, NONE_TEXT};
use super::scoring::{score_dimension, synthesize, ScoringInputs};
use crate::agents::{Agents, CallOptions, Role};
use crate::profile::{is_blank, missing_fields, profile_root, Dimension, StartupProfile};
use crate::prompts::Prompt;
use crate::services::Services;
use crate::tools::tech_stack::{detect_tech_stack, TechStackReport};

launchpad_graph::state_record! {
    pub struct EvaluationState {
        user_data: Value,
        plan: Plan,
        team_report: DimensionReport,
        problem_report: DimensionReport,
        product_report: DimensionReport,
        market_report: DimensionReport,
        traction_report: DimensionReport,
        gtm_report: DimensionReport,
        business_report: DimensionReport,
        vision_report: DimensionReport,
        operations_report: DimensionReport,
        team_checks: CheckReport,
        market_checks: CheckReport,
        traction_checks: CheckReport,
        gtm_checks: CheckReport,
        business_checks: CheckReport,
        vision_checks: CheckReport,
        operations_checks: CheckReport,
        search_results: SearchResults,
        problem_contradiction: String,
        problem_risk_report: String,
        tech_stack: TechStackReport,
        visual_analysis: String,
        product_contradiction: String,
        product_risk_report: String,
        final_memo: Memo,
    }
}

/// Dimensions whose branch is a plain checks → scoring pair.
pub const GENERIC_DIMENSIONS: [Dimension; 7] = [
    Dimension::Team,
    Dimension::Market,
    Dimension::Traction,
    Dimension::Gtm,
    Dimension::Business,
    Dimension::Vision,
    Dimension::Operations,
];

pub fn checks_key(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Team => "team_checks",
        Dimension::Problem => "problem_checks",
        Dimension::Product => "product_checks",
        Dimension::Market => "market_checks",
        Dimension::Traction => "traction_checks",
        Dimension::Gtm => "gtm_checks",
        Dimension::Business => "business_checks",
        Dimension::Vision => "vision_checks",
        Dimension::Operations => "operations_checks",
    }
}

pub fn scoring_node(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Team => "team_scoring",
        Dimension::Problem => "problem_scoring",
        Dimension::Product => "product_scoring",
        Dimension::Market => "market_scoring",
        Dimension::Traction => "traction_scoring",
        Dimension::Gtm => "gtm_scoring",
        Dimension::Business => "business_scoring",
        Dimension::Vision => "vision_scoring",
        Dimension::Operations => "operations_scoring",
    }
}

impl EvaluationState {
    pub fn report(&self, dimension: Dimension) -> Option<&DimensionReport> {
        match dimension {
            Dimension::Team => self.team_report.as_ref(),
            Dimension::Problem => self.problem_report.as_ref(),
            Dimension::Product => self.product_report.as_ref(),
            Dimension::Market => self.market_report.as_ref(),
            Dimension::Traction => self.traction_report.as_ref(),
            Dimension::Gtm => self.gtm_report.as_ref(),
            Dimension::Business => self.business_report.as_ref(),
            Dimension::Vision => self.vision_report.as_ref(),
            Dimension::Operations => self.operations_report.as_ref(),
        }
    }

    fn with_report(dimension: Dimension, report: DimensionReport) -> Self {
        let mut state = Self::default();
        let slot = match dimension {
            Dimension::Team => &mut state.team_report,
            Dimension::Problem => &mut state.problem_report,
            Dimension::Product => &mut state.product_report,
            Dimension::Market => &mut state.market_report,
            Dimension::Traction => &mut state.traction_report,
            Dimension::Gtm => &mut state.gtm_report,
            Dimension::Business => &mut state.business_report,
            Dimension::Vision => &mut state.vision_report,
            Dimension::Operations => &mut state.operations_report,
        };
        *slot = Some(report);
        state
    }

    /// Check reports of the generic dimensions; `None` for problem and
    /// product, which keep their intermediates in dedicated keys.
    pub fn checks(&self, dimension: Dimension) -> Option<&CheckReport> {
        match dimension {
            Dimension::Team => self.team_checks.as_ref(),
            Dimension::Market => self.market_checks.as_ref(),
            Dimension::Traction => self.traction_checks.as_ref(),
            Dimension::Gtm => self.gtm_checks.as_ref(),
            Dimension::Business => self.business_checks.as_ref(),
            Dimension::Vision => self.vision_checks.as_ref(),
            Dimension::Operations => self.operations_checks.as_ref(),
            Dimension::Problem | Dimension::Product => None,
        }
    }

    fn with_checks(dimension: Dimension, checks: CheckReport) -> Self {
        let mut state = Self::default();
        let slot = match dimension {
            Dimension::Team => &mut state.team_checks,
            Dimension::Market => &mut state.market_checks,
            Dimension::Traction => &mut state.traction_checks,
            Dimension::Gtm => &mut state.gtm_checks,
            Dimension::Business => &mut state.business_checks,
            Dimension::Vision => &mut state.vision_checks,
            Dimension::Operations => &mut state.operations_checks,
            Dimension::Problem | Dimension::Product => return state,
        };
        *slot = Some(checks);
        state
    }

    /// All nine reports; a missing one reads as a system error.
    pub fn reports(&self) -> BTreeMap<Dimension, DimensionReport> {
        Dimension::ALL
            .into_iter()
            .map(|d| {
                let report = self
                    .report(d)
                    .cloned()
                    .unwrap_or_else(|| DimensionReport::system_error(format!("{} was not produced", d.report_key())));
                (d, report)
            })
            .collect()
    }

    fn user_data(&self) -> Value {
        self.user_data.clone().unwrap_or(Value::Null)
    }

    fn profile(&self) -> StartupProfile {
        StartupProfile::from_value_lossy(&self.user_data())
    }

    fn missing_fields(&self) -> Vec<String> {
        missing_fields(profile_root(&self.user_data()))
    }
}

struct Planner {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<EvaluationState> for Planner {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let user_data = state.user_data();
        let plan = if is_blank(&user_data) {
            tracing::warn!("empty startup profile; skipping planning");
            Plan::failed()
        } else {
            match self
                .agents
                .run_structured::<Plan>(
                    Role::Planner,
                    Prompt::EvaluationPlan,
                    &json!({ "user_data": profile_root(&user_data) }),
                    CallOptions::default().temperature(0.0),
                )
                .await
            {
                Ok(plan) => plan,
                Err(err) => {
                    tracing::warn!(error = %err, "planning failed");
                    Plan::failed()
                }
            }
        };
        Ok(EvaluationState {
            plan: Some(plan),
            ..EvaluationState::default()
        })
    }
}

struct DimensionChecks {
    agents: Arc<Agents>,
    dimension: Dimension,
}

#[async_trait]
impl Node<EvaluationState> for DimensionChecks {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let view = state.profile().view(self.dimension);
        let checks = if is_blank(&view) {
            CheckReport::default()
        } else {
            run_checks(&self.agents, self.dimension, &view).await
        };
        Ok(EvaluationState::with_checks(self.dimension, checks))
    }
}

struct DimensionScoring {
    agents: Arc<Agents>,
    dimension: Dimension,
}

#[async_trait]
impl Node<EvaluationState> for DimensionScoring {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let view = state.profile().view(self.dimension);
        let checks = state.checks(self.dimension).cloned().unwrap_or_default();
        let missing = state.missing_fields();
        let report = score_dimension(
            &self.agents,
            ScoringInputs {
                dimension: self.dimension,
                view: &view,
                contradiction: &checks.contradiction,
                risk: &checks.risk,
                missing_fields: &missing,
                extra_evidence: NONE_TEXT,
            },
        )
        .await;
        Ok(EvaluationState::with_report(self.dimension, report))
    }
}

struct ProblemChecks {
    services: Services,
}

#[async_trait]
impl Node<EvaluationState> for ProblemChecks {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let profile = state.profile();
        let view = profile.view(Dimension::Problem);
        if is_blank(&view) {
            return Ok(EvaluationState {
                search_results: Some(SearchResults::default()),
                problem_contradiction: Some(NONE_TEXT.to_string()),
                problem_risk_report: Some(NONE_TEXT.to_string()),
                ..EvaluationState::default()
            });
        }
        let agents = &self.services.agents;
        let search = async {
            match pain_queries(agents, &profile).await {
                Some(queries) => pain_search(self.services.search.as_ref(), &queries).await,
                None => SearchResults::default(),
            }
        };
        let (results, contradiction) = tokio::join!(search, contradiction_check(agents, Dimension::Problem, &view));
        tracing::info!(hits = results.all_hits().len(), "pain validation search finished");
        let risk = risk_check(agents, Dimension::Problem, &view, &results.render()).await;
        Ok(EvaluationState {
            problem_contradiction: Some(or_none(Dimension::Problem, "contradiction", contradiction)),
            problem_risk_report: Some(or_none(Dimension::Problem, "risk", risk)),
            search_results: Some(results),
            ..EvaluationState::default()
        })
    }
}

struct ProblemScoring {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<EvaluationState> for ProblemScoring {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let view = state.profile().view(Dimension::Problem);
        let missing = state.missing_fields();
        let evidence = state
            .search_results
            .as_ref()
            .map(SearchResults::render)
            .unwrap_or_else(|| NONE_TEXT.to_string());
        let report = score_dimension(
            &self.agents,
            ScoringInputs {
                dimension: Dimension::Problem,
                view: &view,
                contradiction: state.problem_contradiction.as_deref().unwrap_or(NONE_TEXT),
                risk: state.problem_risk_report.as_deref().unwrap_or(NONE_TEXT),
                missing_fields: &missing,
                extra_evidence: &evidence,
            },
        )
        .await;
        Ok(EvaluationState::with_report(Dimension::Problem, report))
    }
}

struct TechStack {
    services: Services,
}

#[async_trait]
impl Node<EvaluationState> for TechStack {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let profile = state.profile();
        let report = match detect_tech_stack(self.services.pages.as_ref(), profile.website_url()).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(error = %err, "tech stack detection failed");
                TechStackReport {
                    verdict: NONE_TEXT.to_string(),
                    url: profile.website_url().map(str::to_string),
                    ..TechStackReport::default()
                }
            }
        };
        Ok(EvaluationState {
            tech_stack: Some(report),
            ..EvaluationState::default()
        })
    }
}

struct VisualAnalysis {
    services: Services,
}

#[async_trait]
impl Node<EvaluationState> for VisualAnalysis {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let analysis = visual_analysis(&self.services, &state.profile()).await;
        Ok(EvaluationState {
            visual_analysis: Some(analysis),
            ..EvaluationState::default()
        })
    }
}

struct ProductContradiction {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<EvaluationState> for ProductContradiction {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let view = state.profile().view(Dimension::Product);
        let contradiction = if is_blank(&view) {
            NONE_TEXT.to_string()
        } else {
            let result = contradiction_check(&self.agents, Dimension::Product, &view).await;
            or_none(Dimension::Product, "contradiction", result)
        };
        Ok(EvaluationState {
            product_contradiction: Some(contradiction),
            ..EvaluationState::default()
        })
    }
}

struct ProductScoring {
    services: Services,
}

fn product_evidence(tech: &TechStackReport, visual: &str, competitors: &SearchResults) -> String {
    let technologies = if tech.technologies.is_empty() {
        NONE_TEXT.to_string()
    } else {
        tech.technologies.join(", ")
    };
    format!(
        "Tech stack: {} ({technologies})\nLanding page review: {visual}\nCompetitor search:\n{}",
        tech.verdict,
        competitors.render()
    )
}

#[async_trait]
impl Node<EvaluationState> for ProductScoring {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let profile = state.profile();
        let view = profile.view(Dimension::Product);
        let missing = state.missing_fields();
        if is_blank(&view) {
            return Ok(EvaluationState {
                product_risk_report: Some(NONE_TEXT.to_string()),
                product_report: Some(DimensionReport::insufficient_data(&missing)),
                ..EvaluationState::default()
            });
        }
        // The problem branch runs concurrently; when its results are not in
        // yet, search competitors here.
        let competitors = match &state.search_results {
            Some(results) => results.clone(),
            None => competitor_search(self.services.search.as_ref(), &profile).await,
        };
        let tech = state.tech_stack.clone().unwrap_or_else(TechStackReport::no_url);
        let visual = state.visual_analysis.as_deref().unwrap_or(NONE_TEXT);
        let evidence = product_evidence(&tech, visual, &competitors);

        let agents = &self.services.agents;
        let risk = or_none(
            Dimension::Product,
            "risk",
            risk_check(agents, Dimension::Product, &view, &evidence).await,
        );
        let report = score_dimension(
            agents,
            ScoringInputs {
                dimension: Dimension::Product,
                view: &view,
                contradiction: state.product_contradiction.as_deref().unwrap_or(NONE_TEXT),
                risk: &risk,
                missing_fields: &missing,
                extra_evidence: &evidence,
            },
        )
        .await;
        Ok(EvaluationState {
            product_risk_report: Some(risk),
            product_report: Some(report),
            ..EvaluationState::default()
        })
    }
}

struct Synthesis {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<EvaluationState> for Synthesis {
    async fn run(&self, state: &EvaluationState) -> Result<EvaluationState> {
        let memo = synthesize(&self.agents, &state.reports()).await;
        Ok(EvaluationState {
            final_memo: Some(memo),
            ..EvaluationState::default()
        })
    }
}

pub fn build_graph(services: &Services) -> Result<CompiledGraph<EvaluationState>> {
    let agents = services.agents.clone();
    let mut builder = GraphBuilder::new("evaluation")
        .add_node(
            NodeSpec::new("planner", Planner { agents: agents.clone() })
                .reads(&["user_data"])
                .writes(&["plan"]),
        )
        .add_edge(START, "planner");

    for dimension in GENERIC_DIMENSIONS {
        let checks = checks_key(dimension);
        let scoring = scoring_node(dimension);
        builder = builder
            .add_node(
                NodeSpec::new(checks, DimensionChecks { agents: agents.clone(), dimension })
                    .reads(&["user_data"])
                    .writes(&[checks]),
            )
            .add_node(
                NodeSpec::new(scoring, DimensionScoring { agents: agents.clone(), dimension })
                    .reads(&["user_data", checks])
                    .writes(&[dimension.report_key()]),
            )
            .add_edge("planner", checks)
            .add_edge(checks, scoring)
            .add_edge(scoring, "synthesis");
    }

    builder
        .add_node(
            NodeSpec::new("problem_checks", ProblemChecks { services: services.clone() })
                .reads(&["user_data"])
                .writes(&["search_results", "problem_contradiction", "problem_risk_report"]),
        )
        .add_node(
            NodeSpec::new("problem_scoring", ProblemScoring { agents: agents.clone() })
                .reads(&["user_data", "search_results", "problem_contradiction", "problem_risk_report"])
                .writes(&["problem_report"]),
        )
        .add_node(
            NodeSpec::new("tech_stack", TechStack { services: services.clone() })
                .reads(&["user_data"])
                .writes(&["tech_stack"]),
        )
        .add_node(
            NodeSpec::new("visual_analysis", VisualAnalysis { services: services.clone() })
                .reads(&["user_data"])
                .writes(&["visual_analysis"]),
        )
        .add_node(
            NodeSpec::new("product_contradiction", ProductContradiction { agents: agents.clone() })
                .reads(&["user_data"])
                .writes(&["product_contradiction"]),
        )
        .add_node(
            NodeSpec::new("product_scoring", ProductScoring { services: services.clone() })
                .reads(&[
                    "user_data",
                    "search_results",
                    "tech_stack",
                    "visual_analysis",
                    "product_contradiction",
                ])
                .writes(&["product_risk_report", "product_report"]),
        )
        .add_node(
            NodeSpec::new("synthesis", Synthesis { agents })
                .reads(&[
                    "team_report",
                    "problem_report",
                    "product_report",
                    "market_report",
                    "traction_report",
                    "gtm_report",
                    "business_report",
                    "vision_report",
                    "operations_report",
                ])
                .writes(&["final_memo"]),
        )
        .add_fan_out(
            "planner",
            &["problem_checks", "tech_stack", "visual_analysis", "product_contradiction"],
        )
        .add_edge("problem_checks", "problem_scoring")
        .add_fan_in(&["tech_stack", "visual_analysis", "product_contradiction"], "product_scoring")
        .add_fan_in(&["problem_scoring", "product_scoring"], "synthesis")
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_helpers_route_by_dimension() {
        let state = EvaluationState::with_report(Dimension::Gtm, DimensionReport { score: 3, ..Default::default() });
        assert_eq!(state.gtm_report.as_ref().unwrap().score, 3);
        assert_eq!(state.report(Dimension::Gtm).unwrap().score, 3);
        let reports = state.reports();
        assert_eq!(reports.len(), 9);
        assert_eq!(reports[&Dimension::Team].description, "system error");

        let checks = EvaluationState::with_checks(Dimension::Vision, CheckReport::default());
        assert!(checks.vision_checks.is_some());
        assert!(EvaluationState::with_checks(Dimension::Problem, CheckReport::default())
            .checks(Dimension::Problem)
            .is_none());
    }

    #[test]
    fn product_evidence_lists_every_source() {
        let text = product_evidence(&TechStackReport::no_url(), "website offline", &SearchResults::default());
        assert_eq!(
            text,
            "Tech stack: No URL (None)\nLanding page review: website offline\nCompetitor search:\nNone"
        );
    }
}
