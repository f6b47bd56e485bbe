//! The work behind each research node. Every step returns a typed summary
//! and writes its artifact under the run's data directory.

use futures_util::future::join_all;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use launchpad_graph::offload;

use super::model::{Competitor, CompetitorList, FinanceDraft, PainReport, RawPainVerdict, ResearchPlan};
use crate::agents::{Agents, CallOptions, Role};
use crate::prompts::Prompt;
use crate::render::{ChartKind, ChartSpec};
use crate::scoring::{
    assess_evidence, build_model, market_size_score, opportunity_score, validate_market_size, EvidenceItem,
    EvidenceKind, FinancialModel, MarketSizing, OpportunityInputs, OpportunityScore, PainIntensity, SizingRequest,
    SourceSite, SOURCE_SITES,
};
use crate::services::Services;
use crate::tools::search::{dedupe_hits, format_hits, site_query, SearchHit, WebSearch};
use crate::tools::trends::{fetch_first, linear_trend};
use crate::{Error, Result};

pub const COMPETITOR_HITS: usize = 8;
pub const VALIDATION_HITS: usize = 3;
pub const VALIDATION_QUERIES_PER_KIND: usize = 2;
pub const COST_HITS: usize = 4;
/// Evidence lines shown to the pain analyst.
const EVIDENCE_PROMPT_ITEMS: usize = 24;
/// Raw pain assumed when the analyst call fails but evidence exists.
const NEUTRAL_PAIN: f64 = 50.0;

/// `<data dir>/<run id>_<name>`.
pub fn artifact(services: &Services, run_id: &str, name: &str) -> PathBuf {
    services.data_dir().join(format!("{run_id}_{name}"))
}

fn csv_err(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::backend("csv", err)
}

/// Header plus rows, `\n`-terminated, quoted only where needed.
pub fn to_csv(header: &[&str], rows: &[Vec<String>]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    let bytes = writer.into_inner().map_err(|err| csv_err(err.into_error()))?;
    String::from_utf8(bytes).map_err(csv_err)
}

async fn render_chart(services: &Services, spec: ChartSpec, path: PathBuf) -> Option<PathBuf> {
    let charts = services.charts.clone();
    let title = spec.title.clone();
    match offload(move || charts.render(&spec, &[], &path)).await {
        Ok(Ok(written)) => Some(written),
        Ok(Err(err)) => {
            tracing::warn!(chart = %title, error = %err, "chart skipped");
            None
        }
        Err(err) => {
            tracing::warn!(chart = %title, error = %err, "chart skipped");
            None
        }
    }
}

/// The model's plan, completed from the idea text; the templated plan when
/// the call fails.
pub async fn plan_research(agents: &Agents, idea: &str, problem: &str) -> ResearchPlan {
    match agents
        .run_structured::<ResearchPlan>(
            Role::Planner,
            Prompt::ResearchPlan,
            &json!({ "idea": idea, "problem": problem }),
            CallOptions::default().with_fallback(),
        )
        .await
    {
        Ok(plan) => plan.completed(idea, problem),
        Err(err) => {
            tracing::warn!(error = %err, "research planning failed; using the templated plan");
            ResearchPlan::fallback(idea, problem)
        }
    }
}

async fn search_each(search: &dyn WebSearch, queries: &[String], num: usize) -> Vec<SearchHit> {
    let calls = queries.iter().map(|query| async move {
        match search.search(query, num).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(query = %query, error = %err, "search failed");
                Vec::new()
            }
        }
    });
    dedupe_hits(join_all(calls).await.into_iter().flatten().collect())
}

/// Search the plan's competitor queries and let the researcher keep only
/// real competitors.
pub async fn find_competitors(services: &Services, plan: &ResearchPlan, idea: &str) -> Result<Vec<Competitor>> {
    let hits = search_each(services.search.as_ref(), &plan.competitor_queries, COMPETITOR_HITS).await;
    if hits.is_empty() {
        tracing::info!("no competitor search results");
        return Ok(Vec::new());
    }
    let list = services
        .agents
        .run_structured::<CompetitorList>(
            Role::Researcher,
            Prompt::CompetitorFilter,
            &json!({ "idea": idea, "results": format_hits(&hits) }),
            CallOptions::default(),
        )
        .await?;
    let mut seen = HashSet::new();
    Ok(list
        .competitors
        .into_iter()
        .filter(|c| !c.name.is_empty() && seen.insert(c.name.to_ascii_lowercase()))
        .collect())
}

pub async fn write_competitors(path: &Path, competitors: &[Competitor]) -> Result<()> {
    let rows = competitors
        .iter()
        .map(|c| vec![c.name.clone(), c.features.clone()])
        .collect::<Vec<_>>();
    tokio::fs::write(path, to_csv(&["Name", "Features"], &rows)?).await?;
    Ok(())
}

/// Validation queries scoped to every source site, problem and solution
/// kinds alike.
pub async fn collect_evidence(search: &dyn WebSearch, plan: &ResearchPlan) -> Vec<EvidenceItem> {
    let kinds = [
        (EvidenceKind::Problem, &plan.validation_queries.problem),
        (EvidenceKind::Solution, &plan.validation_queries.solution),
    ];
    let sites: &'static [SourceSite] = &SOURCE_SITES;
    let calls = kinds.into_iter().flat_map(|(kind, queries)| {
        queries
            .iter()
            .take(VALIDATION_QUERIES_PER_KIND)
            .flat_map(move |query| sites.iter().map(move |site| (kind, query, site)))
    });
    let searches = calls.map(|(kind, query, site)| async move {
        let scoped = site_query(query, site.domain);
        let hits = match search.search(&scoped, VALIDATION_HITS).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::debug!(source = site.name, error = %err, "validation search failed");
                Vec::new()
            }
        };
        hits.into_iter()
            .map(|hit| EvidenceItem {
                kind,
                title: hit.title,
                snippet: hit.snippet,
                source: site.name.to_string(),
                weight: site.weight,
                credibility: site.credibility,
            })
            .collect::<Vec<_>>()
    });
    let mut seen = HashSet::new();
    join_all(searches)
        .await
        .into_iter()
        .flatten()
        .filter(|item| seen.insert((item.title.clone(), item.snippet.clone())))
        .collect()
}

fn evidence_text(items: &[EvidenceItem]) -> String {
    items
        .iter()
        .take(EVIDENCE_PROMPT_ITEMS)
        .enumerate()
        .map(|(idx, item)| format!("{}. [{}] {}: {}", idx + 1, item.source, item.title.trim(), item.snippet.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Analyst verdict adjusted by the evidence engine. No evidence skips the
/// model and reports insufficient data.
pub async fn judge_pain(agents: &Agents, idea: &str, problem: &str, evidence: Vec<EvidenceItem>) -> PainReport {
    if evidence.is_empty() {
        return PainReport {
            assessment: assess_evidence(0.0, &evidence),
            summary: "No community or review evidence was found.".to_string(),
            key_quotes: Vec::new(),
            evidence,
        };
    }
    let intensity = PainIntensity::scan(&evidence);
    let verdict = agents
        .run_structured::<RawPainVerdict>(
            Role::Analyst,
            Prompt::PainVerdict,
            &json!({
                "idea": idea,
                "problem": problem,
                "intensity": intensity.label(),
                "evidence": evidence_text(&evidence),
            }),
            CallOptions::default(),
        )
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "pain verdict failed; assuming a neutral score");
            RawPainVerdict {
                pain_score: NEUTRAL_PAIN,
                summary: "Pain verdict unavailable; neutral score assumed.".to_string(),
                key_quotes: Vec::new(),
            }
        });
    let assessment = assess_evidence(verdict.pain_score, &evidence);
    tracing::info!(
        raw = assessment.raw_score,
        adjusted = assessment.adjusted_score,
        verdict = assessment.verdict.as_str(),
        "pain assessed"
    );
    PainReport {
        assessment,
        summary: verdict.summary,
        key_quotes: verdict.key_quotes,
        evidence,
    }
}

pub async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrendFindings {
    pub csv: PathBuf,
    pub growth_pct: f64,
    pub chart: Option<PathBuf>,
    pub analysis: String,
}

/// Interest over time for the plan's topic from the first source with data.
pub async fn analyse_trends(services: &Services, run_id: &str, topic: &str) -> Result<TrendFindings> {
    let series = fetch_first(&services.trends, topic).await?;
    let values = series.values();
    let growth_pct = series.growth_pct();
    let (slope, intercept) = linear_trend(&values);
    let trendline = (0..values.len()).map(|i| intercept + slope * i as f64).collect::<Vec<_>>();

    let csv = artifact(services, run_id, "trends.csv");
    let rows = series
        .points
        .iter()
        .map(|p| vec![p.date.clone(), p.value.to_string()])
        .collect::<Vec<_>>();
    tokio::fs::write(&csv, to_csv(&["date", "value"], &rows)?).await?;

    let dates = series.points.iter().map(|p| p.date.clone()).collect();
    let spec = ChartSpec::new(ChartKind::Line, format!("Interest in {topic}"))
        .with_points(dates, values.clone())
        .with_overlay(trendline);
    let chart = render_chart(services, spec, artifact(services, run_id, "trend.svg")).await;

    let direction = match slope {
        s if s > 0.0 => "rising",
        s if s < 0.0 => "declining",
        _ => "flat",
    };
    let analysis = format!(
        "Source: {}. {} daily points for \"{topic}\". Year-over-year growth {growth_pct:+.1}%. The trendline is {direction}.",
        series.source,
        values.len()
    );
    tokio::fs::write(artifact(services, run_id, "trend_analysis.txt"), &analysis).await?;
    Ok(TrendFindings {
        csv,
        growth_pct,
        chart,
        analysis,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinanceFindings {
    pub csv: PathBuf,
    pub model: FinancialModel,
    pub charts: Vec<PathBuf>,
    pub analysis: String,
}

/// Cost research, the CFO persona's estimates, and the derived break-even
/// model.
pub async fn model_finances(
    services: &Services,
    run_id: &str,
    plan: &ResearchPlan,
    idea: &str,
) -> Result<FinanceFindings> {
    let identity = &plan.market_identity;
    let hits = search_each(services.search.as_ref(), &plan.financial_queries, COST_HITS).await;
    let draft = services
        .agents
        .run_structured::<FinanceDraft>(
            Role::Analyst,
            Prompt::FinanceModel,
            &json!({
                "country": identity.target_country,
                "currency_code": identity.currency_code,
                "idea": idea,
                "search_context": format_hits(&hits),
            }),
            CallOptions::default().with_fallback(),
        )
        .await?;
    if draft.startup_costs.is_empty() && draft.monthly_fixed_costs.is_empty() {
        return Err(Error::BackendMessage("finance model returned no costs".to_string()));
    }
    let model = build_model(
        &identity.currency_code,
        draft.startup_costs,
        draft.monthly_fixed_costs,
        draft.revenue_assumptions.daily_customers,
        draft.revenue_assumptions.avg_ticket_price,
        draft.sources_used,
    );

    let csv = artifact(services, run_id, "finance.csv");
    let break_even = model
        .break_even_month
        .map(|m| m.to_string())
        .unwrap_or_else(|| "none".to_string());
    let rows = [
        ("total_startup_costs", format!("{:.2}", model.total_startup)),
        ("total_monthly_fixed_costs", format!("{:.2}", model.total_monthly)),
        ("monthly_revenue", format!("{:.2}", model.monthly_revenue)),
        ("monthly_profit", format!("{:.2}", model.monthly_profit)),
        ("break_even_month", break_even.clone()),
    ]
    .into_iter()
    .map(|(metric, value)| vec![metric.to_string(), value, model.currency_code.clone()])
    .collect::<Vec<_>>();
    tokio::fs::write(&csv, to_csv(&["metric", "value", "currency"], &rows)?).await?;

    let mut charts = Vec::new();
    let pie = ChartSpec::new(ChartKind::Pie, "Startup costs").with_points(
        model.startup_costs.keys().cloned().collect(),
        model.startup_costs.values().copied().collect(),
    );
    if pie.is_renderable() {
        charts.extend(render_chart(services, pie, artifact(services, run_id, "startup_costs.svg")).await);
    }
    let cash = ChartSpec::new(ChartKind::Line, "Cumulative cash flow").with_points(
        model.projection.iter().map(|m| format!("M{}", m.month)).collect(),
        model.projection.iter().map(|m| m.cumulative).collect(),
    );
    charts.extend(render_chart(services, cash, artifact(services, run_id, "cash_flow.svg")).await);

    let symbol = &identity.currency_symbol;
    let analysis = format!(
        "Startup costs {symbol}{:.0}, fixed costs {symbol}{:.0}/month. Revenue at steady state {symbol}{:.0}/month \
         ({:.0} customers/day at {symbol}{:.2}). Monthly profit {symbol}{:.0}. Break-even month: {break_even}.",
        model.total_startup,
        model.total_monthly,
        model.monthly_revenue,
        model.daily_customers,
        model.avg_ticket_price,
        model.monthly_profit,
    );
    tokio::fs::write(artifact(services, run_id, "finance_analysis.txt"), &analysis).await?;
    Ok(FinanceFindings {
        csv,
        model,
        charts,
        analysis,
    })
}

pub fn size_market(plan: &ResearchPlan, competitor_count: usize) -> MarketSizing {
    let identity = &plan.market_identity;
    validate_market_size(&SizingRequest {
        raw_tam: identity.market_size_estimate.clone(),
        industry: identity.industry.clone(),
        geography: identity.target_country.clone(),
        competitor_count,
        funded: false,
    })
}

/// Missing inputs score as "no evidence": pain 0, growth 0, smallest market
/// bucket. Each one is listed in `missing_inputs`.
pub fn grade_opportunity(
    pain: Option<&PainReport>,
    growth_pct: Option<f64>,
    sizing: Option<&MarketSizing>,
    competitor_count: usize,
) -> OpportunityScore {
    let mut score = opportunity_score(OpportunityInputs {
        adjusted_pain: pain.map(|p| p.assessment.adjusted_score).unwrap_or(0.0),
        growth_pct,
        market_size_score: market_size_score(sizing.map(|s| s.tam).unwrap_or(0.0)),
        competitor_count,
    });
    if pain.is_none() {
        score.missing_inputs.insert(0, "pain".to_string());
    }
    if sizing.is_none() {
        score.missing_inputs.push("market_size".to_string());
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hit, FakeSearch};

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        let csv = to_csv(
            &["Name", "Features"],
            &[vec!["Fleetio".into(), "Work orders, parts".into()], vec!["Say \"hi\"".into(), "".into()]],
        )
        .unwrap();
        assert_eq!(csv, "Name,Features\nFleetio,\"Work orders, parts\"\n\"Say \"\"hi\"\"\",\n");
    }

    #[tokio::test]
    async fn evidence_is_stratified_across_sites() {
        let search = FakeSearch::new().with(
            "site:g2.com",
            vec![hit("Terrible tool", "We hate the manual process", "https://g2.com/r/1")],
        );
        let mut plan = ResearchPlan::fallback("fleet maintenance app", "trucks break down");
        plan.validation_queries.problem.push("second".into());
        plan.validation_queries.problem.push("third".into());
        let items = collect_evidence(&search, &plan).await;

        // two problem queries and one solution query, six sites each
        assert_eq!(search.queries().len(), 18);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "g2");
        assert_eq!(items[0].weight, 1.5);
    }

    #[tokio::test]
    async fn no_evidence_means_no_model_call() {
        let llm = crate::test_support::ScriptedLlm::new();
        let agents = crate::test_support::agents_with(llm.clone());
        let report = judge_pain(&agents, "idea", "problem", Vec::new()).await;
        assert_eq!(report.assessment.adjusted_score, 0.0);
        assert_eq!(report.assessment.verdict.as_str(), "INSUFFICIENT_DATA");
        assert!(llm.requests().is_empty());
    }

    #[test]
    fn missing_inputs_grade_low() {
        let score = grade_opportunity(None, None, None, 0);
        // pain 0, growth 0, size 20, winner-take-all 100
        assert_eq!(score.growth_score, 0.0);
        assert_eq!(score.total, 20.0);
        assert_eq!(score.grade.to_string(), "D");
        assert_eq!(score.missing_inputs, vec!["pain", "growth", "market_size"]);
    }
}
