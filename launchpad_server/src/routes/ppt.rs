use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::Multipart;
use axum::routing::post;
use axum::Extension;
use axum::Json;
use launchpad_core::deck::{Critique, Theme};
use launchpad_core::{generate_deck, DeckOutcome, DeckRequest};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct DeckResponse {
    pub message: String,
    pub ppt_path: PathBuf,
    pub iterations: u32,
    pub slides: usize,
    pub theme: Theme,
    pub critique: Option<Critique>,
    pub review_complete: bool,
    pub review_failures: Vec<String>,
}

fn deck_message(iterations: u32, critique: Option<&Critique>, review_failures: &[String]) -> String {
    let mut message = match critique {
        Some(c) => format!(
            "Deck generated after {iterations} refinement(s); critic score {}/100.",
            c.score
        ),
        None => format!("Deck generated after {iterations} refinement(s)."),
    };
    if !review_failures.is_empty() {
        message.push_str(&format!(
            " Review incomplete, rendered the last draft: {}.",
            review_failures.join("; ")
        ));
    }
    message
}

impl From<DeckOutcome> for DeckResponse {
    fn from(outcome: DeckOutcome) -> Self {
        Self {
            message: deck_message(outcome.iterations, outcome.critique.as_ref(), &outcome.review_failures),
            review_complete: outcome.review_complete(),
            ppt_path: outcome.path,
            iterations: outcome.iterations,
            slides: outcome.rendered.slides,
            theme: outcome.rendered.draft.theme,
            critique: outcome.critique,
            review_failures: outcome.review_failures,
        }
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/ppt/generate", post(post_generate))
        .route("/ppt/generate/upload", post(post_generate_upload))
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn post_generate(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<DeckResponse>, ApiError> {
    let request = DeckRequest::from_body(&body)?;
    let outcome = generate_deck(&state.services, request).await?;
    Ok(Json(outcome.into()))
}

/// Multipart fields: `startup_file` and `market_file` (JSON documents),
/// optional `logo` image, `use_default_colors` and `color_palette` (a JSON
/// array string).
#[tracing::instrument(level = "info", skip_all)]
pub async fn post_generate_upload(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DeckResponse>, ApiError> {
    let mut startup = None;
    let mut market = None;
    let mut logo = None;
    let mut use_default_colors = false;
    let mut color_palette = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "startup_file" => startup = Some(json_field(&name, &field.bytes().await?)?),
            "market_file" => market = Some(json_field(&name, &field.bytes().await?)?),
            "logo" => {
                let file_name = field.file_name().unwrap_or("logo.png").to_string();
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    logo = Some((file_name, bytes));
                }
            }
            "use_default_colors" => use_default_colors = parse_flag(&field.text().await?),
            "color_palette" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    color_palette = Some(text);
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown upload field"),
        }
    }

    let (Some(startup), Some(market)) = (startup, market) else {
        return Err(ApiError::InvalidInput(
            "startup_file and market_file are required".to_string(),
        ));
    };
    let logo_path = match logo {
        Some((file_name, bytes)) => {
            Some(save_upload(&state.services.output_dir, &file_name, &bytes).await?)
        }
        None => None,
    };

    let body = json!({
        "startup_info": startup,
        "market_research": market,
        "logo_path": logo_path,
        "color_palette": color_palette,
        "use_default_colors": use_default_colors,
    });
    let request = DeckRequest::from_body(&body)?;
    let outcome = generate_deck(&state.services, request).await?;
    Ok(Json(outcome.into()))
}

fn json_field(name: &str, bytes: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::InvalidInput(format!("{name} is not valid JSON: {e}")))
}

fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn safe_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("logo.png");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "logo.png".to_string()
    } else {
        cleaned
    }
}

async fn save_upload(output_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    let dir = output_dir.join("uploads");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(launchpad_core::Error::from)?;
    let path = dir.join(format!("{}_{}", ulid::Ulid::new(), safe_file_name(file_name)));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(launchpad_core::Error::from)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "stored uploaded logo");
    Ok(path)
}
