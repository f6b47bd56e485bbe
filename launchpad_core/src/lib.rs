//! Launchpad core library: the agent graphs (evaluation, market research,
//! recommendation, pitch deck) and the collaborators they share.

pub mod agents;
pub mod config;
pub mod deck;
pub mod error;
pub mod evaluation;
pub mod lenient;
pub mod market_research;
pub mod o11y;
pub mod profile;
pub mod prompts;
pub mod recommendation;
pub mod render;
pub mod scoring;
pub mod services;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use agents::{Agents, CallOptions, Role};
pub use config::PlatformConfig;
pub use deck::{generate_deck, DeckOutcome, DeckRequest};
pub use error::{Error, Result};
pub use evaluation::{evaluate_startup, EvaluationReport};
pub use market_research::{run_market_research, ResearchOutcome};
pub use profile::{Dimension, StartupProfile};
pub use recommendation::{run_recommendation, RecommendationOutcome};
pub use services::Services;
