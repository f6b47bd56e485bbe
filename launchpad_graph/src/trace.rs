//! Execution trace for a graph run.
//!
//! This module defines the trace returned with every run. It captures:
//! - Per-node timing and outcome
//! - Keys each node committed
//! - An ordered timeline of scheduling events

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

pub const TRACE_SCHEMA_VERSION: &str = "v1";

/// Root trace object returned with every graph execution
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionTrace {
    /// Schema version for backwards compatibility
    pub schema_version: String,
    /// Graph name
    pub graph: String,
    /// Total execution time in milliseconds
    pub total_elapsed_ms: i64,
    /// Time spent in node execution (sum of all nodes)
    pub node_time_ms: i64,
    /// Per-node timing details, one entry per execution
    pub nodes: Vec<NodeTrace>,
    /// Execution timeline (ordered events)
    pub timeline: Vec<TimelineEvent>,
}

/// Timing for a single node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTrace {
    pub name: String,
    /// When this node started (ms from graph start)
    pub started_at_ms: i64,
    pub elapsed_ms: i64,
    /// completed, failed or skipped
    pub outcome: String,
    /// Keys committed to the state
    pub output_keys: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Timestamp (ms from graph start)
    pub ts_ms: i64,
    pub event_type: String,
    pub details: Value,
}

/// Builder for constructing traces during execution
pub struct TraceBuilder {
    start_time: Instant,
    trace: ExecutionTrace,
}

impl TraceBuilder {
    pub fn new(graph: &str) -> Self {
        TraceBuilder {
            start_time: Instant::now(),
            trace: ExecutionTrace {
                schema_version: TRACE_SCHEMA_VERSION.to_string(),
                graph: graph.to_string(),
                ..Default::default()
            },
        }
    }

    /// Get current timestamp in ms from start
    pub fn now_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }

    pub fn start_node(&mut self, name: &str) -> i64 {
        let now = self.now_ms();
        self.add_timeline_event("node_started", serde_json::json!({ "node": name }));
        now
    }

    pub fn finish_node(
        &mut self,
        name: &str,
        started_at_ms: i64,
        outcome: &str,
        output_keys: Vec<&str>,
        error: Option<String>,
    ) {
        let elapsed_ms = self.now_ms().saturating_sub(started_at_ms);
        self.trace.node_time_ms += elapsed_ms;
        self.trace.nodes.push(NodeTrace {
            name: name.to_string(),
            started_at_ms,
            elapsed_ms,
            outcome: outcome.to_string(),
            output_keys: output_keys.iter().map(|k| k.to_string()).collect(),
            error: error.clone(),
        });
        self.add_timeline_event(
            "node_finished",
            serde_json::json!({
                "node": name,
                "outcome": outcome,
                "elapsed_ms": elapsed_ms,
                "error": error,
            }),
        );
    }

    pub fn skip_node(&mut self, name: &str, reason: &str) {
        let now = self.now_ms();
        self.trace.nodes.push(NodeTrace {
            name: name.to_string(),
            started_at_ms: now,
            elapsed_ms: 0,
            outcome: "skipped".to_string(),
            output_keys: Vec::new(),
            error: Some(reason.to_string()),
        });
        self.add_timeline_event(
            "node_skipped",
            serde_json::json!({ "node": name, "reason": reason }),
        );
    }

    pub fn add_timeline_event(&mut self, event_type: &str, details: Value) {
        let ts_ms = self.now_ms();
        self.trace.timeline.push(TimelineEvent {
            ts_ms,
            event_type: event_type.to_string(),
            details,
        });
    }

    pub fn finalize(mut self) -> ExecutionTrace {
        self.trace.total_elapsed_ms = self.now_ms();
        self.trace
    }
}
