//! Built-in prompt registry.
//!
//! Prompt texts live in `launchpad_core/prompts/` and are embedded at compile
//! time. Each file holds a `## system` section followed by a `## user`
//! section; both are rendered with `{{ key }}` placeholders.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use launchpad_graph::error::{GraphError, Result};
use launchpad_graph::template::render_messages;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prompt {
    EvaluationPlan,
    ContradictionCheck,
    RiskCheck,
    PainQueries,
    VisualAnalysis,
    DimensionScore,
    EvaluationSynthesis,
    ResearchPlan,
    CompetitorFilter,
    PainVerdict,
    FinanceModel,
    InvestmentMemo,
    StatementImprover,
    RecommendationReport,
    DeckGenerator,
    DeckCritic,
    DeckRefiner,
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub id: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl Prompt {
    pub const ALL: [Prompt; 17] = [
        Prompt::EvaluationPlan,
        Prompt::ContradictionCheck,
        Prompt::RiskCheck,
        Prompt::PainQueries,
        Prompt::VisualAnalysis,
        Prompt::DimensionScore,
        Prompt::EvaluationSynthesis,
        Prompt::ResearchPlan,
        Prompt::CompetitorFilter,
        Prompt::PainVerdict,
        Prompt::FinanceModel,
        Prompt::InvestmentMemo,
        Prompt::StatementImprover,
        Prompt::RecommendationReport,
        Prompt::DeckGenerator,
        Prompt::DeckCritic,
        Prompt::DeckRefiner,
    ];

    fn source(self) -> (&'static str, &'static str) {
        match self {
            Prompt::EvaluationPlan => ("evaluation_plan", include_str!("../prompts/evaluation_plan.md")),
            Prompt::ContradictionCheck => (
                "contradiction_check",
                include_str!("../prompts/contradiction_check.md"),
            ),
            Prompt::RiskCheck => ("risk_check", include_str!("../prompts/risk_check.md")),
            Prompt::PainQueries => ("pain_queries", include_str!("../prompts/pain_queries.md")),
            Prompt::VisualAnalysis => ("visual_analysis", include_str!("../prompts/visual_analysis.md")),
            Prompt::DimensionScore => ("dimension_score", include_str!("../prompts/dimension_score.md")),
            Prompt::EvaluationSynthesis => (
                "evaluation_synthesis",
                include_str!("../prompts/evaluation_synthesis.md"),
            ),
            Prompt::ResearchPlan => ("research_plan", include_str!("../prompts/research_plan.md")),
            Prompt::CompetitorFilter => (
                "competitor_filter",
                include_str!("../prompts/competitor_filter.md"),
            ),
            Prompt::PainVerdict => ("pain_verdict", include_str!("../prompts/pain_verdict.md")),
            Prompt::FinanceModel => ("finance_model", include_str!("../prompts/finance_model.md")),
            Prompt::InvestmentMemo => ("investment_memo", include_str!("../prompts/investment_memo.md")),
            Prompt::StatementImprover => (
                "statement_improver",
                include_str!("../prompts/statement_improver.md"),
            ),
            Prompt::RecommendationReport => (
                "recommendation_report",
                include_str!("../prompts/recommendation_report.md"),
            ),
            Prompt::DeckGenerator => ("deck_generator", include_str!("../prompts/deck_generator.md")),
            Prompt::DeckCritic => ("deck_critic", include_str!("../prompts/deck_critic.md")),
            Prompt::DeckRefiner => ("deck_refiner", include_str!("../prompts/deck_refiner.md")),
        }
    }
}

static TEMPLATES: LazyLock<HashMap<Prompt, PromptTemplate>> = LazyLock::new(|| {
    Prompt::ALL
        .iter()
        .map(|prompt| {
            let (id, source) = prompt.source();
            (*prompt, parse_template(id, source))
        })
        .collect()
});

fn parse_template(id: &'static str, source: &'static str) -> PromptTemplate {
    let body = source.trim_start();
    let body = body.strip_prefix("## system").unwrap_or(body);
    let (system, user) = match body.split_once("\n## user\n") {
        Some((system, user)) => (system.trim(), user.trim()),
        None => ("", body.trim()),
    };
    PromptTemplate { id, system, user }
}

pub fn template(prompt: Prompt) -> Option<&'static PromptTemplate> {
    TEMPLATES.get(&prompt)
}

/// Render `prompt` into chat messages.
pub fn render(prompt: Prompt, inputs: &Value) -> Result<Vec<Value>> {
    let template = template(prompt)
        .ok_or_else(|| GraphError::internal(format!("prompt {prompt:?} is not registered")))?;
    render_messages(template.system, template.user, inputs)
        .map_err(|err| GraphError::internal(format!("prompt '{}': {err}", template.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_prompt_has_system_and_user_sections() {
        for prompt in Prompt::ALL {
            let template = template(prompt).unwrap();
            assert!(!template.system.is_empty(), "{}", template.id);
            assert!(!template.user.is_empty(), "{}", template.id);
            assert!(!template.system.contains("## user"), "{}", template.id);
        }
    }

    #[test]
    fn render_reports_missing_inputs() {
        let messages = render(Prompt::ResearchPlan, &json!({ "idea": "a", "problem": "b" })).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"], "Idea: a\nProblem: b");

        let err = render(Prompt::ResearchPlan, &json!({ "idea": "a" })).unwrap_err();
        assert!(err.to_string().contains("missing required input field 'problem'"));
    }
}
