use crate::error::ApiError;
use crate::server::AppState;
use axum::Extension;
use axum::Json;
use launchpad_core::{evaluate_startup, EvaluationReport};
use std::sync::Arc;

#[tracing::instrument(level = "info", skip_all)]
pub async fn post_evaluate(
    Extension(state): Extension<Arc<AppState>>,
    Json(profile): Json<serde_json::Value>,
) -> Result<Json<EvaluationReport>, ApiError> {
    let report = evaluate_startup(&state.services, profile).await?;
    Ok(Json(report))
}
