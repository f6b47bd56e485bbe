//! launchpad_graph: typed-state DAG runtime and provider plumbing shared by the
//! launchpad agent pipelines.

#![forbid(unsafe_code)]

pub mod definition;
pub mod engine;
pub mod error;
pub mod json_repair;
pub mod llm;
pub mod node;
pub mod provider;
pub mod ratelimit;
pub mod retry;
pub mod run;
pub mod state;
pub mod template;
pub mod trace;

pub use definition::{GraphBuilder, END, START};
pub use engine::{CompiledGraph, GraphRun, NodeStatus, NodeUpdate};
pub use error::{GraphError, ProviderError, ProviderErrorKind, Result};
pub use node::{fn_node, offload, Node, NodeSpec};
pub use provider::Provider;
pub use state::StateRecord;
