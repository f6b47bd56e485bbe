use crate::error::ApiError;
use crate::server::AppState;
use axum::Extension;
use axum::Json;
use launchpad_core::{run_recommendation, RecommendationOutcome};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub raw_input: serde_json::Value,
    pub evaluation_output: serde_json::Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn post_recommend(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<RecommendationOutcome>, ApiError> {
    let request_id = req.request_id.filter(|id| !id.trim().is_empty());
    let outcome =
        run_recommendation(&state.services, req.raw_input, &req.evaluation_output, request_id).await?;
    Ok(Json(outcome))
}
