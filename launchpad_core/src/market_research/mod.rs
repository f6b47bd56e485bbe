//! Market research for a business idea: competitors, pain validation,
//! demand trend, a break-even model and market sizing, compiled into a PDF
//! memo and a JSON dossier.

pub mod graph;
pub mod model;
pub mod steps;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub use graph::{build_graph, dossier, MarketResearchState};
pub use model::{Competitor, FinanceDraft, MarketIdentity, PainReport, ResearchPlan, ValidationQueries};

use crate::services::Services;
use crate::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub run_id: String,
    pub message: String,
    pub pdf_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub data: Value,
}

impl ResearchOutcome {
    pub fn is_complete(&self) -> bool {
        self.pdf_path.is_some() && self.json_path.is_some()
    }
}

#[tracing::instrument(level = "info", skip(services, problem))]
pub async fn run_market_research(services: &Services, idea: &str, problem: &str) -> Result<ResearchOutcome> {
    let idea = idea.trim();
    if idea.is_empty() {
        return Err(Error::InvalidInput("idea must not be empty".to_string()));
    }
    tokio::fs::create_dir_all(services.data_dir()).await?;
    let run_id = ulid::Ulid::new().to_string();
    let graph = build_graph(services)?;
    let run = graph
        .invoke(MarketResearchState {
            input_idea: Some(idea.to_string()),
            input_problem: Some(problem.trim().to_string()),
            run_id: Some(run_id.clone()),
            ..MarketResearchState::default()
        })
        .await?;
    if let Some((node, err)) = run.failures().first() {
        tracing::warn!(node, error = %err, "market research failed");
        return Err((*err).clone().into());
    }
    let state = run.state;
    let data = dossier(&state);
    let (pdf_path, json_path) = match (state.pdf_path, state.json_path) {
        (Some(pdf), Some(json)) => (Some(pdf), Some(json)),
        _ => (None, None),
    };
    let message = state
        .market_research
        .unwrap_or_else(|| "Market research finished without a report.".to_string());
    Ok(ResearchOutcome {
        run_id,
        message,
        pdf_path,
        json_path,
        data,
    })
}
