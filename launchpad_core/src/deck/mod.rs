//! Pitch-deck generation: a bounded draft/critique/refine loop followed by
//! rendering to a deck file.

pub mod graph;
pub mod model;
pub mod packager;
pub mod pptx;
pub mod render;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

pub use graph::{build_graph, DeckState, TARGET_SCORE};
pub use model::{Critique, Draft, Section, Theme};
pub use packager::{DeckPackager, ShapeModelPackager, SlideDeck};
pub use pptx::PptxPackager;
pub use render::{render_deck, PaletteSource, RenderedDeck, ResolvedTheme, ThemeInputs};

use crate::services::Services;
use crate::tools::palette::{parse_palette_json, validate_palette};
use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckRequest {
    pub research_data: Value,
    #[serde(default)]
    pub logo_path: Option<PathBuf>,
    #[serde(default)]
    pub color_palette: Option<Vec<String>>,
    #[serde(default)]
    pub use_default_colors: bool,
}

impl DeckRequest {
    /// Accepts either `research_data` or the `startup_info` and
    /// `market_research` pair, which is folded into `research_data`.
    pub fn from_body(body: &Value) -> Result<Self> {
        let research_data = match body.get("research_data").filter(|v| !v.is_null()) {
            Some(data) => data.clone(),
            None => match (body.get("startup_info"), body.get("market_research")) {
                (None, None) => {
                    return Err(Error::InvalidInput(
                        "provide research_data or startup_info and market_research".to_string(),
                    ))
                }
                (startup, market) => json!({
                    "startup_info": startup.cloned().unwrap_or(Value::Null),
                    "market_research": market.cloned().unwrap_or(Value::Null),
                }),
            },
        };
        let color_palette = match body.get("color_palette") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(parse_palette_json(text)?),
            Some(other) => {
                let values: Vec<String> = serde_json::from_value(other.clone())
                    .map_err(|e| Error::InvalidInput(format!("color_palette: {e}")))?;
                Some(validate_palette(&values)?)
            }
        };
        Ok(Self {
            research_data,
            logo_path: body
                .get("logo_path")
                .and_then(Value::as_str)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            color_palette,
            use_default_colors: body
                .get("use_default_colors")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DeckOutcome {
    pub path: PathBuf,
    pub iterations: u32,
    pub critique: Option<Critique>,
    /// `node: error` for each critic or refiner call that failed. Non-empty
    /// means the rendered draft skipped part of its review.
    pub review_failures: Vec<String>,
    pub rendered: RenderedDeck,
}

impl DeckOutcome {
    /// The critic scored the final draft and no refinement step failed.
    pub fn review_complete(&self) -> bool {
        self.critique.is_some() && self.review_failures.is_empty()
    }
}

/// Run the refinement loop and render whatever draft it ends with. A failed
/// critic or refiner keeps the best draft so far and is reported in
/// `review_failures`; no draft at all is an error.
#[tracing::instrument(level = "info", skip_all)]
pub async fn generate_deck(services: &Services, request: DeckRequest) -> Result<DeckOutcome> {
    if request.research_data.is_null() {
        return Err(Error::InvalidInput("research_data is required".to_string()));
    }
    if let Some(logo) = &request.logo_path {
        if !logo.exists() {
            return Err(Error::InvalidInput(format!("logo not found: {}", logo.display())));
        }
    }
    let graph = build_graph(services.agents.clone(), services.ppt_max_iterations)?;
    let initial = DeckState {
        research_data: Some(request.research_data.clone()),
        logo_path: request.logo_path.as_ref().map(|p| p.display().to_string()),
        color_palette: request.color_palette.clone(),
        use_default_colors: Some(request.use_default_colors),
        max_iterations: Some(services.ppt_max_iterations),
        ..DeckState::default()
    };
    let run = graph.invoke(initial).await?;
    let mut review_failures = Vec::new();
    for (node, err) in run.failures() {
        tracing::warn!(node, error = %err, "deck node failed");
        review_failures.push(format!("{node}: {err}"));
    }
    let Some(draft) = run.state.draft.clone() else {
        let cause = run
            .failures()
            .first()
            .map(|(_, err)| (*err).clone())
            .unwrap_or_else(|| launchpad_graph::GraphError::internal("deck generator produced no draft"));
        return Err(cause.into());
    };
    let inputs = ThemeInputs {
        color_palette: request.color_palette.as_deref(),
        logo_path: request.logo_path.as_deref(),
        use_default_colors: request.use_default_colors,
    };
    let rendered = render_deck(services, draft, &inputs).await?;
    Ok(DeckOutcome {
        path: rendered.path.clone(),
        iterations: run.state.iteration.unwrap_or(0),
        critique: run.state.critique,
        review_failures,
        rendered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{services_with, ScriptedLlm};
    use launchpad_graph::ProviderErrorKind;

    const DRAFT: &str = r#"{"title": "FleetFix", "theme": "minimalist",
        "sections": [{"title": "Problem", "content": ["Downtime"], "speaker_notes": "pain"}]}"#;

    #[test]
    fn request_shapes() {
        let req = DeckRequest::from_body(&json!({
            "startup_info": {"name": "FleetFix"},
            "market_research": {"tam": "$2B"},
            "color_palette": "[\"#112233\"]",
            "use_default_colors": false
        }))
        .unwrap();
        assert_eq!(req.research_data["market_research"]["tam"], "$2B");
        assert_eq!(req.color_palette, Some(vec!["#112233".to_string()]));

        let req = DeckRequest::from_body(&json!({"research_data": {"a": 1}, "color_palette": ["#abc"]})).unwrap();
        assert_eq!(req.color_palette, Some(vec!["#AABBCC".to_string()]));
        assert!(DeckRequest::from_body(&json!({})).is_err());
        assert!(DeckRequest::from_body(&json!({"research_data": {}, "color_palette": "nope"})).is_err());
    }

    #[tokio::test]
    async fn generates_and_renders_a_deck() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new()
            .reply("Build an investor deck", DRAFT)
            .reply("demanding investor", r#"{"critique": "great", "score": 93, "recommendations": []}"#);
        let services = services_with(llm, dir.path());
        let outcome = generate_deck(
            &services,
            DeckRequest {
                research_data: json!({"idea": "fleet repair"}),
                ..DeckRequest::default()
            },
        )
        .await
        .unwrap();
        assert!(outcome.path.exists());
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.review_complete());
        assert_eq!(outcome.critique.unwrap().score, 93);
        assert_eq!(outcome.rendered.theme.theme, Theme::Minimalist);
    }

    #[tokio::test]
    async fn critic_failure_is_reported_with_the_rendered_draft() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new()
            .reply("Build an investor deck", DRAFT)
            .fail("demanding investor", ProviderErrorKind::QuotaExceeded);
        let services = services_with(llm, dir.path());
        let outcome = generate_deck(
            &services,
            DeckRequest {
                research_data: json!({"idea": "fleet repair"}),
                ..DeckRequest::default()
            },
        )
        .await
        .unwrap();
        assert!(outcome.path.exists());
        assert!(outcome.critique.is_none());
        assert!(!outcome.review_complete());
        assert_eq!(outcome.review_failures.len(), 1);
        assert!(outcome.review_failures[0].starts_with("recommender: "));
    }

    #[tokio::test]
    async fn generator_quota_surfaces_as_quota_error() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new().fail("Build an investor deck", ProviderErrorKind::QuotaExceeded);
        let services = services_with(llm, dir.path());
        let err = generate_deck(
            &services,
            DeckRequest {
                research_data: json!({"idea": "x"}),
                ..DeckRequest::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }
}
