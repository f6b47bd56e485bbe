//! Generator → critic → refiner loop.
//!
//! The loop is a conditional edge after the critic: it ends once the deck
//! scores at least [`TARGET_SCORE`] or the refiner has run `max_iterations`
//! times. Only the refiner writes `iteration`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use launchpad_graph::error::{GraphError, Result};
use launchpad_graph::{CompiledGraph, GraphBuilder, Node, NodeSpec, END, START};

use super::model::{Critique, Draft};
use crate::agents::{Agents, CallOptions, Role};
use crate::prompts::Prompt;

pub const TARGET_SCORE: u32 = 90;

launchpad_graph::state_record! {
    pub struct DeckState {
        research_data: Value,
        logo_path: String,
        color_palette: Vec<String>,
        use_default_colors: bool,
        max_iterations: u32,
        draft: Draft,
        critique: Critique,
        iteration: u32,
    }
}

/// Where the loop goes after a critique.
pub fn route(state: &DeckState, default_max: u32) -> &'static str {
    let iteration = state.iteration.unwrap_or(0);
    let max = state.max_iterations.unwrap_or(default_max);
    let score = state.critique.as_ref().map(|c| c.score).unwrap_or(0);
    if iteration >= max || score >= TARGET_SCORE {
        END
    } else {
        "refiner"
    }
}

fn draft_json(draft: &Draft) -> Result<String> {
    serde_json::to_string_pretty(draft).map_err(|e| GraphError::internal(format!("serialize draft: {e}")))
}

struct Generator {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<DeckState> for Generator {
    async fn run(&self, state: &DeckState) -> Result<DeckState> {
        let research = state
            .research_data
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or_else(|| GraphError::bad_request("research_data is required"))?;
        let draft: Draft = self
            .agents
            .run_structured(
                Role::Designer,
                Prompt::DeckGenerator,
                &json!({ "research_data": research }),
                CallOptions::default().with_fallback(),
            )
            .await?;
        if !draft.is_usable() {
            return Err(GraphError::internal("generator returned a deck without sections"));
        }
        tracing::info!(sections = draft.sections.len(), theme = %draft.theme, "deck draft generated");
        Ok(DeckState {
            draft: Some(draft),
            ..DeckState::default()
        })
    }
}

struct Critic {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<DeckState> for Critic {
    async fn run(&self, state: &DeckState) -> Result<DeckState> {
        let draft = state
            .draft
            .as_ref()
            .ok_or_else(|| GraphError::internal("critic ran without a draft"))?;
        let critique: Critique = self
            .agents
            .run_structured(
                Role::Critic,
                Prompt::DeckCritic,
                &json!({ "draft": draft_json(draft)? }),
                CallOptions::default().with_fallback(),
            )
            .await?;
        tracing::info!(
            score = critique.score,
            iteration = state.iteration.unwrap_or(0),
            "deck critique"
        );
        Ok(DeckState {
            critique: Some(critique),
            ..DeckState::default()
        })
    }
}

struct Refiner {
    agents: Arc<Agents>,
}

#[async_trait]
impl Node<DeckState> for Refiner {
    async fn run(&self, state: &DeckState) -> Result<DeckState> {
        let (Some(draft), Some(critique)) = (&state.draft, &state.critique) else {
            return Err(GraphError::internal("refiner needs a draft and a critique"));
        };
        let inputs = json!({
            "draft": draft_json(draft)?,
            "critique": critique,
            "research_data": state.research_data.clone().unwrap_or(Value::Null),
        });
        let mut revised: Draft = self
            .agents
            .run_structured(Role::Designer, Prompt::DeckRefiner, &inputs, CallOptions::default().with_fallback())
            .await?;
        if !revised.is_usable() {
            tracing::warn!("refiner returned an empty deck; keeping the previous draft");
            revised = draft.clone();
        }
        Ok(DeckState {
            draft: Some(revised),
            iteration: Some(state.iteration.unwrap_or(0) + 1),
            ..DeckState::default()
        })
    }
}

pub fn build_graph(agents: Arc<Agents>, default_max_iterations: u32) -> Result<CompiledGraph<DeckState>> {
    GraphBuilder::new("ppt_generation")
        .add_node(
            NodeSpec::new("generator", Generator { agents: agents.clone() })
                .reads(&["research_data"])
                .writes(&["draft"]),
        )
        .add_node(
            NodeSpec::new("recommender", Critic { agents: agents.clone() })
                .reads(&["draft", "iteration"])
                .writes(&["critique"]),
        )
        .add_node(
            NodeSpec::new("refiner", Refiner { agents })
                .reads(&["draft", "critique", "research_data", "iteration"])
                .writes(&["draft", "iteration"]),
        )
        .add_edge(START, "generator")
        .add_edge("generator", "recommender")
        .add_conditional_edges("recommender", &["refiner", END], move |state: &DeckState| {
            route(state, default_max_iterations).to_string()
        })
        .add_edge("refiner", "recommender")
        .compile()
}
