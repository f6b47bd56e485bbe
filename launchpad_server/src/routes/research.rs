use crate::error::ApiError;
use crate::server::AppState;
use axum::Extension;
use axum::Json;
use launchpad_core::run_market_research;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub idea: String,
    #[serde(default)]
    pub problem: String,
}

#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub run_id: String,
    pub message: String,
    pub pdf_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub data: serde_json::Value,
}

/// A run whose compile step failed still answers 200 with both paths null
/// and the failure in `message`.
#[tracing::instrument(level = "info", skip_all)]
pub async fn post_research(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let outcome = run_market_research(&state.services, &req.idea, &req.problem).await?;
    Ok(Json(ResearchResponse {
        run_id: outcome.run_id,
        message: outcome.message,
        pdf_path: outcome.pdf_path,
        json_path: outcome.json_path,
        data: outcome.data,
    }))
}
