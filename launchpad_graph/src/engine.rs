use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::definition::{ConditionalEdge, END};
use crate::error::{GraphError, Result};
use crate::node::NodeSpec;
use crate::run::RunConfig;
use crate::state::StateRecord;
use crate::trace::{ExecutionTrace, TraceBuilder};

/// Outcome of a single node within a run.
#[derive(Clone, Debug)]
pub enum NodeStatus {
    Completed,
    Failed(GraphError),
    /// An upstream node failed, so this one never started.
    Skipped(String),
    NotRun,
}

impl NodeStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Clone, Debug)]
pub struct GraphRun<S> {
    pub state: S,
    pub statuses: BTreeMap<String, NodeStatus>,
    pub trace: ExecutionTrace,
}

impl<S> GraphRun<S> {
    pub fn status(&self, node: &str) -> Option<&NodeStatus> {
        self.statuses.get(node)
    }

    pub fn failures(&self) -> Vec<(&str, &GraphError)> {
        self.statuses
            .iter()
            .filter_map(|(name, status)| match status {
                NodeStatus::Failed(err) => Some((name.as_str(), err)),
                _ => None,
            })
            .collect()
    }
}

/// A committed node output, as emitted by [`CompiledGraph::stream`].
#[derive(Clone, Debug)]
pub struct NodeUpdate<S> {
    pub node: String,
    pub update: S,
}

struct GraphInner<S: StateRecord> {
    name: String,
    nodes: HashMap<String, NodeSpec<S>>,
    successors: HashMap<String, Vec<String>>,
    join_degree: HashMap<String, usize>,
    conditional: HashMap<String, ConditionalEdge<S>>,
    entries: Vec<String>,
    static_scope: HashSet<String>,
}

/// A validated graph ready to run. Cheap to clone; share one per process.
pub struct CompiledGraph<S: StateRecord> {
    inner: Arc<GraphInner<S>>,
    run_config: RunConfig,
}

impl<S: StateRecord> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            run_config: self.run_config.clone(),
        }
    }
}

impl<S: StateRecord> CompiledGraph<S> {
    pub(crate) fn new(
        name: String,
        nodes: HashMap<String, NodeSpec<S>>,
        successors: HashMap<String, Vec<String>>,
        join_degree: HashMap<String, usize>,
        conditional: HashMap<String, ConditionalEdge<S>>,
        entries: Vec<String>,
        static_scope: HashSet<String>,
    ) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                name,
                nodes,
                successors,
                join_degree,
                conditional,
                entries,
                static_scope,
            }),
            run_config: RunConfig::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn node_names(&self) -> Vec<&str> {
        let mut names = self.inner.nodes.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Default budgets applied by [`invoke`](Self::invoke) and
    /// [`stream`](Self::stream).
    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub async fn invoke(&self, initial: S) -> Result<GraphRun<S>> {
        self.execute(initial, &self.run_config, CancellationToken::new(), None)
            .await
    }

    /// Run until completion or until `cancel` fires. Nodes still in flight at
    /// cancellation are detached and their outputs discarded.
    pub async fn invoke_with_cancel(&self, initial: S, cancel: CancellationToken) -> Result<GraphRun<S>> {
        self.execute(initial, &self.run_config, cancel, None).await
    }

    pub async fn invoke_with_config(
        &self,
        initial: S,
        run_config: &RunConfig,
        cancel: CancellationToken,
    ) -> Result<GraphRun<S>> {
        self.execute(initial, run_config, cancel, None).await
    }

    /// Run in the background, yielding each committed node output in commit
    /// order. A run-level failure is yielded as the final item.
    pub fn stream(&self, initial: S) -> ReceiverStream<Result<NodeUpdate<S>>> {
        let (tx, rx) = mpsc::channel(64);
        let graph = self.clone();
        tokio::spawn(async move {
            let result = graph
                .execute(initial, &graph.run_config, CancellationToken::new(), Some(tx.clone()))
                .await;
            if let Err(err) = result {
                let _ = tx.send(Err(err)).await;
            }
        });
        ReceiverStream::new(rx)
    }

    async fn execute(
        &self,
        initial: S,
        run_config: &RunConfig,
        cancel: CancellationToken,
        sink: Option<mpsc::Sender<Result<NodeUpdate<S>>>>,
    ) -> Result<GraphRun<S>> {
        let graph = self.inner.as_ref();
        let max_supersteps = run_config.max_supersteps();
        let max_concurrent = run_config.max_concurrent_nodes();
        let node_timeout = run_config.node_timeout();
        let deadline = run_config.max_time().map(|limit| Instant::now() + limit);

        let mut state = initial;
        let mut trace = TraceBuilder::new(&graph.name);
        let mut schedule = Schedule::new(graph);
        let mut in_flight = FuturesUnordered::new();
        let mut steps = 0i64;

        tracing::debug!(graph = %graph.name, entries = ?graph.entries, "graph run started");

        loop {
            while in_flight.len() < max_concurrent {
                let Some(node_id) = schedule.ready.pop_front() else {
                    break;
                };
                if steps >= max_supersteps {
                    return Err(GraphError::bad_request(format!(
                        "graph '{}' exceeded max_supersteps ({max_supersteps})",
                        graph.name
                    )));
                }
                steps += 1;

                let spec = graph.nodes.get(&node_id).ok_or_else(|| {
                    GraphError::internal(format!("node '{node_id}' not found in graph '{}'", graph.name))
                })?;
                let node = spec.node.clone();
                let snapshot = state.clone();
                let started_at_ms = trace.start_node(&node_id);
                let handle = tokio::spawn(async move {
                    match node_timeout {
                        Some(limit) => match tokio::time::timeout(limit, node.run(&snapshot)).await {
                            Ok(result) => result,
                            Err(_) => Err(GraphError::Timeout(format!(
                                "node exceeded {}ms",
                                limit.as_millis()
                            ))),
                        },
                        None => node.run(&snapshot).await,
                    }
                });
                in_flight.push(async move { (node_id, started_at_ms, handle.await) });
            }

            if in_flight.is_empty() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(graph = %graph.name, "graph run cancelled");
                    return Err(GraphError::Cancelled);
                }
                _ = sleep_until(deadline) => {
                    return Err(GraphError::Timeout(format!(
                        "graph '{}' exceeded max_time_ms",
                        graph.name
                    )));
                }
                next = in_flight.next() => next,
            };
            let Some((node_id, started_at_ms, joined)) = next else {
                break;
            };

            let outcome = match joined {
                Ok(result) => result,
                Err(err) => Err(GraphError::internal(format!("node '{node_id}' panicked: {err}"))),
            };
            let outcome = outcome.and_then(|update| match graph.nodes.get(&node_id) {
                Some(spec) => check_writes(spec, update),
                None => Err(GraphError::internal(format!("node '{node_id}' vanished"))),
            });

            match outcome {
                Ok(update) => {
                    let keys = update.written_keys();
                    if let Some(sink) = &sink {
                        let _ = sink
                            .send(Ok(NodeUpdate {
                                node: node_id.clone(),
                                update: update.clone(),
                            }))
                            .await;
                    }
                    state.merge(update);
                    trace.finish_node(&node_id, started_at_ms, "completed", keys, None);
                    schedule.completed(&node_id, &state, &mut trace)?;
                }
                Err(err) => {
                    tracing::warn!(graph = %graph.name, node = %node_id, error = %err, "node failed");
                    trace.finish_node(&node_id, started_at_ms, "failed", Vec::new(), Some(err.to_string()));
                    schedule.failed(&node_id, err, &mut trace);
                }
            }
        }

        tracing::debug!(graph = %graph.name, steps, "graph run finished");
        Ok(GraphRun {
            state,
            statuses: schedule.statuses,
            trace: trace.finalize(),
        })
    }
}

/// Readiness bookkeeping for one run.
struct Schedule<'g, S: StateRecord> {
    graph: &'g GraphInner<S>,
    remaining: HashMap<String, usize>,
    /// Join targets with at least one failed or skipped static predecessor.
    poisoned: HashMap<String, String>,
    statuses: BTreeMap<String, NodeStatus>,
    ready: VecDeque<String>,
}

enum Arrival {
    Waiting,
    Ready,
    Blocked(String),
}

impl<'g, S: StateRecord> Schedule<'g, S> {
    fn new(graph: &'g GraphInner<S>) -> Self {
        Self {
            graph,
            remaining: graph.join_degree.clone(),
            poisoned: HashMap::new(),
            statuses: graph
                .nodes
                .keys()
                .map(|name| (name.clone(), NodeStatus::NotRun))
                .collect(),
            ready: graph.entries.iter().cloned().collect(),
        }
    }

    fn completed(&mut self, node_id: &str, state: &S, trace: &mut TraceBuilder) -> Result<()> {
        let graph = self.graph;
        self.statuses.insert(node_id.to_string(), NodeStatus::Completed);
        let in_static_scope = graph.static_scope.contains(node_id);
        for next in graph.successors.get(node_id).into_iter().flatten() {
            if !in_static_scope {
                self.ready.push_back(next.clone());
                continue;
            }
            match self.arrive(next) {
                Arrival::Waiting => {}
                Arrival::Ready => self.ready.push_back(next.clone()),
                Arrival::Blocked(reason) => self.skip(next, reason, trace),
            }
        }

        if let Some(edge) = graph.conditional.get(node_id) {
            let target = (edge.router)(state);
            if target == END {
                tracing::debug!(graph = %graph.name, node = %node_id, "router finished branch");
            } else if edge.targets.contains(&target) {
                self.ready.push_back(target);
            } else {
                return Err(GraphError::internal(format!(
                    "router on '{node_id}' returned undeclared target '{target}'"
                )));
            }
        }
        Ok(())
    }

    /// Record one static predecessor settling on `node`.
    fn arrive(&mut self, node: &str) -> Arrival {
        if let Some(count) = self.remaining.get_mut(node) {
            if *count > 0 {
                *count -= 1;
                if *count > 0 {
                    return Arrival::Waiting;
                }
            }
        }
        match self.poisoned.get(node) {
            Some(reason) => Arrival::Blocked(reason.clone()),
            None => Arrival::Ready,
        }
    }

    fn failed(&mut self, node_id: &str, err: GraphError, trace: &mut TraceBuilder) {
        self.statuses.insert(node_id.to_string(), NodeStatus::Failed(err));
        self.cascade(node_id, trace);
    }

    fn skip(&mut self, node_id: &str, reason: String, trace: &mut TraceBuilder) {
        if !matches!(self.statuses.get(node_id), Some(NodeStatus::NotRun)) {
            return;
        }
        trace.skip_node(node_id, &reason);
        self.statuses.insert(node_id.to_string(), NodeStatus::Skipped(reason));
        self.cascade(node_id, trace);
    }

    /// Propagate a failure or skip of `source` to everything it would have
    /// triggered.
    fn cascade(&mut self, source: &str, trace: &mut TraceBuilder) {
        let graph = self.graph;
        let reason = format!("upstream node '{source}' did not complete");
        let in_static_scope = graph.static_scope.contains(source);
        let mut blocked = Vec::new();
        for next in graph.successors.get(source).into_iter().flatten() {
            if in_static_scope {
                self.poisoned
                    .entry(next.clone())
                    .or_insert_with(|| reason.clone());
                if !matches!(self.arrive(next), Arrival::Waiting) {
                    blocked.push(next.clone());
                }
            } else {
                blocked.push(next.clone());
            }
        }
        if let Some(edge) = graph.conditional.get(source) {
            blocked.extend(edge.targets.iter().filter(|t| t.as_str() != END).cloned());
        }
        for next in blocked {
            self.skip(&next, reason.clone(), trace);
        }
    }
}

fn check_writes<S: StateRecord>(spec: &NodeSpec<S>, update: S) -> Result<S> {
    let undeclared = update
        .written_keys()
        .into_iter()
        .filter(|key| !spec.writes.contains(key))
        .collect::<Vec<_>>();
    if undeclared.is_empty() {
        Ok(update)
    } else {
        Err(GraphError::internal(format!(
            "node '{}' wrote undeclared keys: {}",
            spec.name,
            undeclared.join(", ")
        )))
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{GraphBuilder, START};
    use crate::node::fn_node;
    use crate::run::BudgetConfig;
    use std::time::Duration;

    crate::state_record! {
        pub struct Doc {
            a: u32,
            b: u32,
            c: u32,
        }
    }

    fn diamond(fail_left: bool) -> CompiledGraph<Doc> {
        GraphBuilder::new("diamond")
            .add_node(
                NodeSpec::new(
                    "left",
                    fn_node(move |_s: Doc| async move {
                        if fail_left {
                            return Err(GraphError::unavailable("left is down"));
                        }
                        Ok(Doc {
                            a: Some(2),
                            ..Default::default()
                        })
                    }),
                )
                .writes(&["a"]),
            )
            .add_node(
                NodeSpec::new(
                    "right",
                    fn_node(|_s: Doc| async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(Doc {
                            b: Some(3),
                            ..Default::default()
                        })
                    }),
                )
                .writes(&["b"]),
            )
            .add_node(
                NodeSpec::new(
                    "join",
                    fn_node(|s: Doc| async move {
                        Ok(Doc {
                            c: Some(s.a.unwrap_or(0) * s.b.unwrap_or(0)),
                            ..Default::default()
                        })
                    }),
                )
                .reads(&["a", "b"])
                .writes(&["c"]),
            )
            .add_fan_out(START, &["left", "right"])
            .add_fan_in(&["left", "right"], "join")
            .compile()
            .expect("diamond compiles")
    }

    #[tokio::test]
    async fn join_waits_for_every_branch() {
        let run = diamond(false).invoke(Doc::default()).await.unwrap();
        assert_eq!(run.state.c, Some(6));
        assert!(run.statuses.values().all(NodeStatus::is_completed));
        assert_eq!(run.trace.nodes.len(), 3);
    }

    #[tokio::test]
    async fn failed_branch_skips_join_but_sibling_commits() {
        let run = diamond(true).invoke(Doc::default()).await.unwrap();
        assert_eq!(run.state.b, Some(3));
        assert_eq!(run.state.c, None);
        assert!(matches!(run.status("left"), Some(NodeStatus::Failed(_))));
        assert!(matches!(run.status("join"), Some(NodeStatus::Skipped(_))));
        assert_eq!(run.failures().len(), 1);
    }

    fn review_loop() -> GraphBuilder<Doc> {
        GraphBuilder::new("review_loop")
            .add_node(
                NodeSpec::new(
                    "draft",
                    fn_node(|_s: Doc| async {
                        Ok(Doc {
                            a: Some(1),
                            ..Default::default()
                        })
                    }),
                )
                .writes(&["a"]),
            )
            .add_node(
                NodeSpec::new(
                    "review",
                    fn_node(|s: Doc| async move {
                        Ok(Doc {
                            b: Some(s.b.unwrap_or(0) + 1),
                            c: Some(s.a.unwrap_or(0) * 10),
                            ..Default::default()
                        })
                    }),
                )
                .reads(&["a", "b"])
                .writes(&["b", "c"]),
            )
            .add_node(
                NodeSpec::new(
                    "refine",
                    fn_node(|s: Doc| async move {
                        Ok(Doc {
                            a: Some(s.a.unwrap_or(0) + 1),
                            ..Default::default()
                        })
                    }),
                )
                .reads(&["a"])
                .writes(&["a"]),
            )
            .add_edge(START, "draft")
            .add_edge("draft", "review")
            .add_edge("refine", "review")
    }

    #[tokio::test]
    async fn router_loop_runs_until_threshold() {
        let graph = review_loop()
            .add_conditional_edges("review", &["refine", END], |s: &Doc| {
                if s.c.unwrap_or(0) >= 30 {
                    END.to_string()
                } else {
                    "refine".to_string()
                }
            })
            .compile()
            .unwrap();
        let run = graph.invoke(Doc::default()).await.unwrap();
        assert_eq!(run.state.a, Some(3));
        assert_eq!(run.state.b, Some(3));
        assert_eq!(run.state.c, Some(30));
        assert_eq!(run.trace.nodes.iter().filter(|n| n.name == "review").count(), 3);
    }

    #[tokio::test]
    async fn runaway_router_hits_superstep_budget() {
        let graph = review_loop()
            .add_conditional_edges("review", &["refine", END], |_s: &Doc| "refine".to_string())
            .compile()
            .unwrap()
            .with_run_config(RunConfig {
                budgets: Some(BudgetConfig {
                    max_supersteps: Some(6),
                    max_time_ms: None,
                }),
                ..Default::default()
            });
        let err = graph.invoke(Doc::default()).await.unwrap_err();
        assert!(matches!(err, GraphError::BadRequest(msg) if msg.contains("max_supersteps")));
    }

    #[tokio::test]
    async fn undeclared_write_fails_the_node() {
        let graph = GraphBuilder::new("sneaky")
            .add_node(
                NodeSpec::new(
                    "sneaky",
                    fn_node(|_s: Doc| async {
                        Ok(Doc {
                            a: Some(1),
                            b: Some(1),
                            ..Default::default()
                        })
                    }),
                )
                .writes(&["a"]),
            )
            .add_edge(START, "sneaky")
            .compile()
            .unwrap();
        let run = graph.invoke(Doc::default()).await.unwrap();
        assert!(run.state.is_empty());
        let Some(NodeStatus::Failed(err)) = run.status("sneaky") else {
            panic!("expected failure");
        };
        assert!(err.to_string().contains("undeclared keys: b"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_run() {
        let graph = GraphBuilder::new("slow")
            .add_node(
                NodeSpec::new(
                    "slow",
                    fn_node(|_s: Doc| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(Doc::default())
                    }),
                )
                .writes(&["a"]),
            )
            .add_edge(START, "slow")
            .compile()
            .unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = graph.invoke_with_cancel(Doc::default(), cancel).await.unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }

    #[tokio::test]
    async fn stream_yields_updates_in_commit_order() {
        let graph = GraphBuilder::new("chain")
            .add_node(
                NodeSpec::new(
                    "first",
                    fn_node(|_s: Doc| async {
                        Ok(Doc {
                            a: Some(1),
                            ..Default::default()
                        })
                    }),
                )
                .writes(&["a"]),
            )
            .add_node(
                NodeSpec::new(
                    "second",
                    fn_node(|s: Doc| async move {
                        Ok(Doc {
                            b: s.a.map(|a| a + 1),
                            ..Default::default()
                        })
                    }),
                )
                .writes(&["b"]),
            )
            .add_edge(START, "first")
            .add_edge("first", "second")
            .compile()
            .unwrap();
        let updates = graph
            .stream(Doc::default())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let order = updates.iter().map(|u| u.node.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["first", "second"]);
        assert_eq!(updates[1].update.b, Some(2));
    }
}
