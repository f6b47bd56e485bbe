//! Market-research chain:
//! `plan → competitors → validation → trends → finance → sizing → report → compile`.
//!
//! After `plan`, no node fails the run. A failing step logs a warning and
//! leaves its keys unset; later steps work with whatever is present.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use launchpad_graph::error::Result;
use launchpad_graph::{CompiledGraph, GraphBuilder, Node, NodeSpec, START};

use super::model::{Competitor, PainReport, ResearchPlan};
use super::steps::{
    analyse_trends, artifact, collect_evidence, find_competitors, grade_opportunity, judge_pain, model_finances,
    plan_research, size_market, write_competitors, write_json,
};
use crate::agents::{CallOptions, Role};
use crate::prompts::Prompt;
use crate::render::{PdfDocument, PdfSection};
use crate::scoring::{FinancialModel, MarketSizing, OpportunityScore};
use crate::services::Services;

launchpad_graph::state_record! {
    pub struct MarketResearchState {
        input_idea: String,
        input_problem: String,
        run_id: String,
        research_plan: ResearchPlan,
        competitors_file: PathBuf,
        competitors: Vec<Competitor>,
        competitor_count: usize,
        validation_file: PathBuf,
        pain: PainReport,
        trends_file: PathBuf,
        growth_pct: f64,
        trend_analysis: String,
        finance_file: PathBuf,
        finance: FinancialModel,
        finance_analysis: String,
        market_limit_file: PathBuf,
        market_size: MarketSizing,
        opportunity: OpportunityScore,
        report_text: String,
        pdf_path: PathBuf,
        json_path: PathBuf,
        market_research: String,
    }
}

impl MarketResearchState {
    fn idea(&self) -> &str {
        self.input_idea.as_deref().unwrap_or_default()
    }

    fn problem(&self) -> &str {
        self.input_problem.as_deref().unwrap_or_default()
    }

    fn run_id(&self) -> &str {
        self.run_id.as_deref().unwrap_or("research")
    }

    fn plan(&self) -> ResearchPlan {
        self.research_plan
            .clone()
            .unwrap_or_else(|| ResearchPlan::fallback(self.idea(), self.problem()))
    }

    fn competitor_count(&self) -> usize {
        self.competitor_count.unwrap_or_default()
    }
}

fn skipped(step: &str, err: impl std::fmt::Display) -> MarketResearchState {
    tracing::warn!(step, error = %err, "research step skipped");
    MarketResearchState::default()
}

struct Plan {
    services: Services,
}

#[async_trait]
impl Node<MarketResearchState> for Plan {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        let plan = plan_research(&self.services.agents, state.idea(), state.problem()).await;
        tracing::info!(
            industry = %plan.market_identity.industry,
            country = %plan.market_identity.target_country,
            "research planned"
        );
        Ok(MarketResearchState {
            research_plan: Some(plan),
            ..MarketResearchState::default()
        })
    }
}

struct Competitors {
    services: Services,
}

#[async_trait]
impl Node<MarketResearchState> for Competitors {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        let competitors = match find_competitors(&self.services, &state.plan(), state.idea()).await {
            Ok(found) => found,
            Err(err) => return Ok(skipped("competitors", err)),
        };
        if competitors.is_empty() {
            return Ok(MarketResearchState {
                competitor_count: Some(0),
                competitors: Some(competitors),
                ..MarketResearchState::default()
            });
        }
        let path = artifact(&self.services, state.run_id(), "competitors.csv");
        if let Err(err) = write_competitors(&path, &competitors).await {
            return Ok(skipped("competitors", err));
        }
        Ok(MarketResearchState {
            competitors_file: Some(path),
            competitor_count: Some(competitors.len()),
            competitors: Some(competitors),
            ..MarketResearchState::default()
        })
    }
}

struct Validation {
    services: Services,
}

#[async_trait]
impl Node<MarketResearchState> for Validation {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        let evidence = collect_evidence(self.services.search.as_ref(), &state.plan()).await;
        let found_evidence = !evidence.is_empty();
        let pain = judge_pain(&self.services.agents, state.idea(), state.problem(), evidence).await;
        if !found_evidence {
            return Ok(MarketResearchState {
                pain: Some(pain),
                ..MarketResearchState::default()
            });
        }
        let path = artifact(&self.services, state.run_id(), "validation.json");
        if let Err(err) = write_json(&path, &pain).await {
            return Ok(skipped("validation", err));
        }
        Ok(MarketResearchState {
            validation_file: Some(path),
            pain: Some(pain),
            ..MarketResearchState::default()
        })
    }
}

struct Trends {
    services: Services,
}

#[async_trait]
impl Node<MarketResearchState> for Trends {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        let plan = state.plan();
        let topic = plan.market_identity.wikipedia_topic.trim();
        let topic = if topic.is_empty() { state.idea() } else { topic };
        match analyse_trends(&self.services, state.run_id(), topic).await {
            Ok(findings) => Ok(MarketResearchState {
                trends_file: Some(findings.csv),
                growth_pct: Some(findings.growth_pct),
                trend_analysis: Some(findings.analysis),
                ..MarketResearchState::default()
            }),
            Err(err) => Ok(skipped("trends", err)),
        }
    }
}

struct Finance {
    services: Services,
}

#[async_trait]
impl Node<MarketResearchState> for Finance {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        match model_finances(&self.services, state.run_id(), &state.plan(), state.idea()).await {
            Ok(findings) => {
                tracing::info!(break_even = ?findings.model.break_even_month, "finance modelled");
                Ok(MarketResearchState {
                    finance_file: Some(findings.csv),
                    finance: Some(findings.model),
                    finance_analysis: Some(findings.analysis),
                    ..MarketResearchState::default()
                })
            }
            Err(err) => Ok(skipped("finance", err)),
        }
    }
}

struct Sizing {
    services: Services,
}

#[async_trait]
impl Node<MarketResearchState> for Sizing {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        let sizing = size_market(&state.plan(), state.competitor_count());
        for warning in &sizing.warnings {
            tracing::info!(warning = %warning, "market sizing adjusted");
        }
        let path = artifact(&self.services, state.run_id(), "market_size.json");
        if let Err(err) = write_json(&path, &sizing).await {
            return Ok(skipped("sizing", err));
        }
        Ok(MarketResearchState {
            market_limit_file: Some(path),
            market_size: Some(sizing),
            ..MarketResearchState::default()
        })
    }
}

/// Deterministic facts section of the memo.
pub fn facts_markdown(state: &MarketResearchState, opportunity: &OpportunityScore) -> String {
    let mut lines = vec![
        format!("# Market Research: {}", state.idea()),
        String::new(),
        format!(
            "**Opportunity grade {} ({:.1}/100).** {}",
            opportunity.grade,
            opportunity.total,
            opportunity.grade.summary()
        ),
        String::new(),
        "## Scorecard".to_string(),
        format!("- Pain: {:.0}/100", opportunity.pain_score),
        match state.growth_pct {
            Some(_) => format!("- Growth: {:.0}/100", opportunity.growth_score),
            None => "- Growth: 0/100 (no trend data)".to_string(),
        },
        format!("- Market size: {:.0}/100", opportunity.market_size_score),
        format!(
            "- Competition: {:.0}/100 ({})",
            opportunity.competition_score, opportunity.market_structure
        ),
    ];
    lines.push(String::new());
    lines.push("## Problem Validation".to_string());
    match &state.pain {
        Some(pain) => {
            let a = &pain.assessment;
            lines.push(format!(
                "Verdict {} on {} evidence items; raw pain {:.0}, adjusted {:.1}.",
                a.verdict.as_str(),
                a.evidence_count,
                a.raw_score,
                a.adjusted_score
            ));
            if !pain.summary.is_empty() {
                lines.push(pain.summary.clone());
            }
            lines.extend(pain.key_quotes.iter().map(|q| format!("> {q}")));
        }
        None => lines.push("Not available.".to_string()),
    }
    lines.push(String::new());
    lines.push("## Market Size".to_string());
    match &state.market_size {
        Some(size) => {
            lines.push(format!("TAM {}, SAM {}, SOM {}.", size.tam_text, size.sam_text, size.som_text));
            lines.extend(size.warnings.iter().map(|w| format!("- {w}")));
        }
        None => lines.push("Not available.".to_string()),
    }
    lines.push(String::new());
    lines.push("## Demand Trend".to_string());
    lines.push(state.trend_analysis.clone().unwrap_or_else(|| "Not available.".to_string()));
    lines.push(String::new());
    lines.push("## Competition".to_string());
    match state.competitors.as_deref() {
        Some([]) | None => lines.push("No direct competitors identified.".to_string()),
        Some(competitors) => lines.extend(competitors.iter().map(|c| format!("- {}: {}", c.name, c.features))),
    }
    lines.push(String::new());
    lines.push("## Financials".to_string());
    lines.push(state.finance_analysis.clone().unwrap_or_else(|| "Not available.".to_string()));
    lines.join("\n")
}

struct Report {
    services: Services,
}

#[async_trait]
impl Node<MarketResearchState> for Report {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        let opportunity = grade_opportunity(
            state.pain.as_ref(),
            state.growth_pct,
            state.market_size.as_ref(),
            state.competitor_count(),
        );
        let facts = facts_markdown(state, &opportunity);
        let narrative = self
            .services
            .agents
            .run_prompt(
                Role::Writer,
                Prompt::InvestmentMemo,
                &json!({ "idea": state.idea(), "facts": facts }),
                CallOptions::text().with_fallback(),
            )
            .await;
        let report_text = match narrative {
            Ok(text) if !text.trim().is_empty() => format!("{facts}\n\n{}", text.trim()),
            Ok(_) => facts,
            Err(err) => {
                tracing::warn!(error = %err, "memo narrative skipped");
                facts
            }
        };
        tracing::info!(grade = %opportunity.grade, total = opportunity.total, "opportunity graded");
        Ok(MarketResearchState {
            opportunity: Some(opportunity),
            report_text: Some(report_text),
            ..MarketResearchState::default()
        })
    }
}

/// Consolidated JSON view of a run.
pub fn dossier(state: &MarketResearchState) -> Value {
    json!({
        "run_id": state.run_id(),
        "idea": state.idea(),
        "problem": state.problem(),
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "research_plan": state.research_plan,
        "competitors": state.competitors,
        "validation": state.pain,
        "trends": {
            "growth_pct": state.growth_pct,
            "analysis": state.trend_analysis,
        },
        "finance": state.finance,
        "market_size": state.market_size,
        "opportunity": state.opportunity,
        "report": state.report_text,
        "files": {
            "competitors": state.competitors_file,
            "validation": state.validation_file,
            "trends": state.trends_file,
            "finance": state.finance_file,
            "market_size": state.market_limit_file,
        },
    })
}

fn pdf_document(state: &MarketResearchState) -> PdfDocument {
    let subtitle = state
        .opportunity
        .as_ref()
        .map(|o| format!("Opportunity grade {} ({:.1}/100)", o.grade, o.total));
    let report = state.report_text.clone().unwrap_or_default();
    let mut sections = Vec::new();
    let mut current = PdfSection::new("Summary");
    for block in report.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        if let Some(heading) = block.strip_prefix("## ") {
            let (heading, body) = heading.split_once('\n').unwrap_or((heading, ""));
            sections.push(std::mem::replace(&mut current, PdfSection::new(heading.trim())));
            if !body.trim().is_empty() {
                current = current.paragraph(body.trim().replace("**", ""));
            }
        } else if !block.starts_with("# ") {
            current = current.paragraph(block.replace("**", ""));
        }
    }
    sections.push(current);
    sections.retain(|s| !s.paragraphs.is_empty());
    PdfDocument {
        title: format!("Market Research: {}", state.idea()),
        subtitle,
        sections,
    }
}

struct Compile {
    services: Services,
}

impl Compile {
    async fn write(&self, state: &MarketResearchState) -> crate::Result<(PathBuf, PathBuf)> {
        let json_path = artifact(&self.services, state.run_id(), "market_research.json");
        let pdf_path = artifact(&self.services, state.run_id(), "market_research.pdf");
        write_json(&json_path, &dossier(state)).await?;

        let pdf = self.services.pdf.clone();
        let doc = pdf_document(state);
        let out = pdf_path.clone();
        let rendered = launchpad_graph::offload(move || pdf.render(&doc, &out))
            .await
            .map_err(crate::Error::from)
            .and_then(|r| r);
        if let Err(err) = rendered {
            // Both paths or neither.
            if let Err(cleanup) = tokio::fs::remove_file(&json_path).await {
                tracing::debug!(error = %cleanup, "dossier cleanup failed");
            }
            return Err(err);
        }
        Ok((pdf_path, json_path))
    }
}

#[async_trait]
impl Node<MarketResearchState> for Compile {
    async fn run(&self, state: &MarketResearchState) -> Result<MarketResearchState> {
        match self.write(state).await {
            Ok((pdf_path, json_path)) => {
                let summary = match &state.opportunity {
                    Some(o) => format!(
                        "Market research for \"{}\" complete: grade {} ({:.1}/100).",
                        state.idea(),
                        o.grade,
                        o.total
                    ),
                    None => format!("Market research for \"{}\" complete.", state.idea()),
                };
                Ok(MarketResearchState {
                    pdf_path: Some(pdf_path),
                    json_path: Some(json_path),
                    market_research: Some(summary),
                    ..MarketResearchState::default()
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "research compile failed");
                Ok(MarketResearchState {
                    market_research: Some(format!("Market research could not be compiled: {err}")),
                    ..MarketResearchState::default()
                })
            }
        }
    }
}

pub fn build_graph(services: &Services) -> Result<CompiledGraph<MarketResearchState>> {
    GraphBuilder::new("market_research")
        .add_node(
            NodeSpec::new("plan", Plan { services: services.clone() })
                .reads(&["input_idea", "input_problem"])
                .writes(&["research_plan"]),
        )
        .add_node(
            NodeSpec::new("competitors", Competitors { services: services.clone() })
                .reads(&["input_idea", "run_id", "research_plan"])
                .writes(&["competitors_file", "competitors", "competitor_count"]),
        )
        .add_node(
            NodeSpec::new("validation", Validation { services: services.clone() })
                .reads(&["input_idea", "input_problem", "run_id", "research_plan"])
                .writes(&["validation_file", "pain"]),
        )
        .add_node(
            NodeSpec::new("trends", Trends { services: services.clone() })
                .reads(&["input_idea", "run_id", "research_plan"])
                .writes(&["trends_file", "growth_pct", "trend_analysis"]),
        )
        .add_node(
            NodeSpec::new("finance", Finance { services: services.clone() })
                .reads(&["input_idea", "run_id", "research_plan"])
                .writes(&["finance_file", "finance", "finance_analysis"]),
        )
        .add_node(
            NodeSpec::new("sizing", Sizing { services: services.clone() })
                .reads(&["run_id", "research_plan", "competitor_count"])
                .writes(&["market_limit_file", "market_size"]),
        )
        .add_node(
            NodeSpec::new("report", Report { services: services.clone() })
                .reads(&[
                    "input_idea",
                    "pain",
                    "growth_pct",
                    "trend_analysis",
                    "competitors",
                    "competitor_count",
                    "finance_analysis",
                    "market_size",
                ])
                .writes(&["opportunity", "report_text"]),
        )
        .add_node(
            NodeSpec::new("compile", Compile { services: services.clone() })
                .reads(&[
                    "input_idea",
                    "input_problem",
                    "run_id",
                    "research_plan",
                    "competitors",
                    "competitors_file",
                    "pain",
                    "validation_file",
                    "growth_pct",
                    "trend_analysis",
                    "trends_file",
                    "finance",
                    "finance_file",
                    "market_size",
                    "market_limit_file",
                    "opportunity",
                    "report_text",
                ])
                .writes(&["pdf_path", "json_path", "market_research"]),
        )
        .add_edge(START, "plan")
        .add_edge("plan", "competitors")
        .add_edge("competitors", "validation")
        .add_edge("validation", "trends")
        .add_edge("trends", "finance")
        .add_edge("finance", "sizing")
        .add_edge("sizing", "report")
        .add_edge("report", "compile")
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_sections_follow_the_markdown_headings() {
        let state = MarketResearchState {
            input_idea: Some("Meal kits".into()),
            report_text: Some("# Market Research: Meal kits\n\n**Grade B.** Good.\n\n## Market Size\nTAM $1.0 Billion.\n\n## Thesis\nStrong demand.".into()),
            ..MarketResearchState::default()
        };
        let doc = pdf_document(&state);
        assert_eq!(doc.title, "Market Research: Meal kits");
        let headings: Vec<_> = doc.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Summary", "Market Size", "Thesis"]);
        assert_eq!(doc.sections[0].paragraphs, vec!["Grade B. Good."]);
    }
}
