//! Diligence checks that feed scoring: contradiction and risk reviews, pain
//! validation search, and the landing-page review.
//!
//! None of these fail the graph. A failed call becomes `"None"` in the
//! report it would have filled.

use serde_json::{json, Value};

use launchpad_graph::error::Result;

use super::model::{CheckReport, PainQueries, SearchResults, NONE_TEXT};
use crate::agents::{Agents, CallOptions, Role};
use crate::profile::{Dimension, StartupProfile};
use crate::prompts::Prompt;
use crate::services::Services;
use crate::tools::search::{dedupe_hits, WebSearch};

pub const HITS_PER_QUERY: usize = 5;
pub const WEBSITE_OFFLINE: &str = "website offline";

pub(crate) fn or_none(dimension: Dimension, what: &str, result: Result<String>) -> String {
    match result {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => NONE_TEXT.to_string(),
        Err(err) => {
            tracing::warn!(dimension = %dimension, check = what, error = %err, "check failed");
            NONE_TEXT.to_string()
        }
    }
}

pub async fn contradiction_check(agents: &Agents, dimension: Dimension, view: &Value) -> Result<String> {
    agents
        .run_prompt(
            Role::Checker,
            Prompt::ContradictionCheck,
            &json!({ "dimension": dimension.label(), "profile": view }),
            CallOptions::text(),
        )
        .await
}

pub async fn risk_check(agents: &Agents, dimension: Dimension, view: &Value, evidence: &str) -> Result<String> {
    agents
        .run_prompt(
            Role::Checker,
            Prompt::RiskCheck,
            &json!({ "dimension": dimension.label(), "profile": view, "evidence": evidence }),
            CallOptions::text(),
        )
        .await
}

/// Contradiction and risk reviews side by side.
pub async fn run_checks(agents: &Agents, dimension: Dimension, view: &Value) -> CheckReport {
    let (contradiction, risk) = tokio::join!(
        contradiction_check(agents, dimension, view),
        risk_check(agents, dimension, view, NONE_TEXT),
    );
    CheckReport {
        contradiction: or_none(dimension, "contradiction", contradiction),
        risk: or_none(dimension, "risk", risk),
    }
}

pub fn customer_text(profile: &StartupProfile) -> String {
    let customer = &profile.problem_definition.customer_profile;
    let parts: Vec<&str> = [&customer.role, &customer.company_size, &customer.industry]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        NONE_TEXT.to_string()
    } else {
        parts.join(", ")
    }
}

/// Three query kinds for the problem; falls back to templated queries when
/// the model call fails. `None` when there is no problem statement.
pub async fn pain_queries(agents: &Agents, profile: &StartupProfile) -> Option<PainQueries> {
    let problem = profile
        .problem_definition
        .problem_statement
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())?;
    let generated = agents
        .run_structured::<PainQueries>(
            Role::Researcher,
            Prompt::PainQueries,
            &json!({ "problem": problem, "customer": customer_text(profile) }),
            CallOptions::default(),
        )
        .await;
    match generated {
        Ok(queries) if queries.is_complete() => Some(queries),
        Ok(_) => Some(PainQueries::from_problem(problem)),
        Err(err) => {
            tracing::warn!(error = %err, "pain query generation failed; using templated queries");
            Some(PainQueries::from_problem(problem))
        }
    }
}

/// Run every labelled query concurrently. A failed search contributes no
/// hits.
pub async fn search_all(search: &dyn WebSearch, queries: &[(&str, &str)]) -> SearchResults {
    let calls = queries.iter().map(|(kind, query)| async move {
        let hits = match search.search(query, HITS_PER_QUERY).await {
            Ok(hits) => dedupe_hits(hits),
            Err(err) => {
                tracing::warn!(kind, error = %err, "search failed");
                Vec::new()
            }
        };
        (kind.to_string(), query.to_string(), hits)
    });
    let mut results = SearchResults::default();
    for (kind, query, hits) in futures_util::future::join_all(calls).await {
        results.queries.insert(kind.clone(), query);
        results.hits.insert(kind, hits);
    }
    results
}

pub async fn pain_search(search: &dyn WebSearch, queries: &PainQueries) -> SearchResults {
    search_all(search, &queries.labelled()).await
}

/// Narrower variant used by product scoring when the problem branch has not
/// published its results.
pub async fn competitor_search(search: &dyn WebSearch, profile: &StartupProfile) -> SearchResults {
    let subject = profile
        .product_and_solution
        .differentiation
        .as_deref()
        .or(profile.problem_definition.problem_statement.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    match subject {
        Some(subject) => {
            let query = format!("{subject} competitors alternatives");
            search_all(search, &[("competitor_solutions", query.as_str())]).await
        }
        None => SearchResults::default(),
    }
}

/// Screenshot the landing page and have the vision model review it.
pub async fn visual_analysis(services: &Services, profile: &StartupProfile) -> String {
    let Some(url) = profile.website_url() else {
        return WEBSITE_OFFLINE.to_string();
    };
    let shot = match services.screenshots.capture(url).await {
        Ok(shot) => shot,
        Err(err) => {
            tracing::warn!(url, error = %err, "screenshot failed");
            return NONE_TEXT.to_string();
        }
    };
    let inputs = json!({ "company_name": profile.company_name(), "website_url": url });
    match services
        .agents
        .describe_image(Prompt::VisualAnalysis, &inputs, &shot.base64, &shot.mime)
        .await
    {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => NONE_TEXT.to_string(),
        Err(err) => {
            tracing::warn!(url, error = %err, "visual analysis failed");
            NONE_TEXT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::sample_profile;
    use crate::test_support::{agents_with, hit, services_with, FakeScreenshot, FakeSearch, ScriptedLlm};
    use crate::tools::search::DisabledSearch;
    use launchpad_graph::ProviderErrorKind;
    use std::sync::Arc;

    fn profile() -> StartupProfile {
        StartupProfile::from_value(&sample_profile()).unwrap()
    }

    #[tokio::test]
    async fn failed_checks_become_none() {
        let llm = ScriptedLlm::new()
            .reply("forensic diligence reviewer", "Founded after first shipment.")
            .fail("skeptical early-stage investor", ProviderErrorKind::BadRequest);
        let agents = agents_with(llm);
        let report = run_checks(&agents, Dimension::Team, &profile().view(Dimension::Team)).await;
        assert_eq!(report.contradiction, "Founded after first shipment.");
        assert_eq!(report.risk, "None");
    }

    #[tokio::test]
    async fn pain_queries_fall_back_to_templates() {
        let llm = ScriptedLlm::new().reply("validate whether a customer problem is real", r#"{"technical_pain": ""}"#);
        let queries = pain_queries(&agents_with(llm), &profile()).await.unwrap();
        assert!(queries.technical_pain.starts_with("Unplanned truck breakdowns"));
        assert!(queries.is_complete());
        assert!(pain_queries(&agents_with(ScriptedLlm::new()), &StartupProfile::default()).await.is_none());
    }

    #[tokio::test]
    async fn searches_run_per_kind_and_tolerate_missing_keys() {
        let search = FakeSearch::new().with("forum", vec![hit("t", "s", "https://a"), hit("t2", "s2", "https://a")]);
        let results = pain_search(&search, &PainQueries::from_problem("fleet downtime")).await;
        assert_eq!(results.hits.len(), 3);
        assert_eq!(results.hits["human_symptom"].len(), 1);
        assert_eq!(search.queries().len(), 3);

        let none = pain_search(&DisabledSearch, &PainQueries::from_problem("x")).await;
        assert!(none.is_empty());
        assert_eq!(none.render(), "None");
    }

    #[tokio::test]
    async fn visual_analysis_paths() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new().reply("auditing a startup landing page", "Clean and credible.");
        let mut services = services_with(llm, dir.path());
        assert_eq!(visual_analysis(&services, &StartupProfile::default()).await, WEBSITE_OFFLINE);
        assert_eq!(visual_analysis(&services, &profile()).await, "None");
        services.screenshots = Arc::new(FakeScreenshot);
        assert_eq!(visual_analysis(&services, &profile()).await, "Clean and credible.");
    }
}
