use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::engine::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::node::NodeSpec;
use crate::state::StateRecord;

/// Virtual source node: edges from `START` mark entry points.
pub const START: &str = "__start__";
/// Virtual sink returned by routers to finish a branch.
pub const END: &str = "__end__";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

impl Diagnostic {
    fn error(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            path: Some(path.into()),
        }
    }

    fn warning(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

pub type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Edge whose target is chosen from the state once the source commits.
pub struct ConditionalEdge<S> {
    pub targets: Vec<String>,
    pub router: Router<S>,
}

impl<S> Clone for ConditionalEdge<S> {
    fn clone(&self) -> Self {
        Self {
            targets: self.targets.clone(),
            router: self.router.clone(),
        }
    }
}

pub struct GraphBuilder<S: StateRecord> {
    name: String,
    nodes: Vec<NodeSpec<S>>,
    edges: Vec<(String, String)>,
    conditional: Vec<(String, ConditionalEdge<S>)>,
}

impl<S: StateRecord> GraphBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            conditional: Vec::new(),
        }
    }

    pub fn add_node(mut self, spec: NodeSpec<S>) -> Self {
        self.nodes.push(spec);
        self
    }

    /// `to` may start once `from` has committed. Several edges into one node
    /// form a join.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Fan `from` out to every node in `targets`.
    pub fn add_fan_out(mut self, from: &str, targets: &[&str]) -> Self {
        for target in targets {
            self.edges.push((from.to_string(), (*target).to_string()));
        }
        self
    }

    /// Join every node in `sources` into `to`.
    pub fn add_fan_in(mut self, sources: &[&str], to: &str) -> Self {
        for source in sources {
            self.edges.push(((*source).to_string(), to.to_string()));
        }
        self
    }

    /// After `from` commits, `router` picks the next node among `targets`
    /// (or [`END`]).
    pub fn add_conditional_edges<F>(mut self, from: impl Into<String>, targets: &[&str], router: F) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        self.conditional.push((
            from.into(),
            ConditionalEdge {
                targets: targets.iter().map(|t| (*t).to_string()).collect(),
                router: Arc::new(router),
            },
        ));
        self
    }

    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut names = HashSet::new();
        for spec in &self.nodes {
            if spec.name == START || spec.name == END {
                diagnostics.push(Diagnostic::error(
                    format!("'{}' is a reserved node name", spec.name),
                    format!("nodes.{}", spec.name),
                ));
            }
            if !names.insert(spec.name.clone()) {
                diagnostics.push(Diagnostic::error(
                    format!("duplicate node '{}'", spec.name),
                    format!("nodes.{}", spec.name),
                ));
            }
            for key in spec.reads.iter().chain(spec.writes.iter()) {
                if !S::has_key(key) {
                    diagnostics.push(Diagnostic::error(
                        format!("node '{}' declares unknown state key '{key}'", spec.name),
                        format!("nodes.{}", spec.name),
                    ));
                }
            }
            if spec.writes.is_empty() {
                diagnostics.push(Diagnostic::warning(
                    format!("node '{}' declares no writes", spec.name),
                    format!("nodes.{}", spec.name),
                ));
            }
        }

        for (from, to) in &self.edges {
            if from != START && !names.contains(from) {
                diagnostics.push(Diagnostic::error(
                    format!("edge source '{from}' is not a node"),
                    format!("edges.{from}"),
                ));
            }
            if to != END && !names.contains(to) {
                diagnostics.push(Diagnostic::error(
                    format!("edge target '{to}' is not a node"),
                    format!("edges.{from}"),
                ));
            }
        }
        let mut routed = HashSet::new();
        for (from, edge) in &self.conditional {
            if !names.contains(from) {
                diagnostics.push(Diagnostic::error(
                    format!("conditional edge source '{from}' is not a node"),
                    format!("conditional_edges.{from}"),
                ));
            }
            if !routed.insert(from.clone()) {
                diagnostics.push(Diagnostic::error(
                    format!("node '{from}' has more than one router"),
                    format!("conditional_edges.{from}"),
                ));
            }
            for target in &edge.targets {
                if target != END && !names.contains(target) {
                    diagnostics.push(Diagnostic::error(
                        format!("conditional target '{target}' is not a node"),
                        format!("conditional_edges.{from}"),
                    ));
                }
            }
        }
        if !self.edges.iter().any(|(from, _)| from == START) {
            diagnostics.push(Diagnostic::error("graph has no entry edge from START", "edges"));
        }
        if diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
        {
            return diagnostics;
        }

        if let Some(node) = find_static_cycle(&self.edges) {
            diagnostics.push(Diagnostic::error(
                format!("static edges form a cycle through '{node}'; cycles need a conditional edge"),
                format!("edges.{node}"),
            ));
            return diagnostics;
        }

        let reachable = reachable_from(START, &self.edges, &self.conditional);
        for spec in &self.nodes {
            if !reachable.contains(&spec.name) {
                diagnostics.push(Diagnostic::error(
                    format!("node '{}' is unreachable from START", spec.name),
                    format!("nodes.{}", spec.name),
                ));
            }
        }

        // Two writers of the same key must be ordered by the edges, otherwise
        // they could run concurrently.
        let mut writers: BTreeMap<&'static str, Vec<&str>> = BTreeMap::new();
        for spec in &self.nodes {
            for key in &spec.writes {
                writers.entry(*key).or_default().push(spec.name.as_str());
            }
        }
        for (key, nodes) in writers {
            for (i, a) in nodes.iter().enumerate() {
                for b in nodes.iter().skip(i + 1) {
                    let a_then_b = reachable_from(a, &self.edges, &self.conditional).contains(*b);
                    let b_then_a = reachable_from(b, &self.edges, &self.conditional).contains(*a);
                    if !a_then_b && !b_then_a {
                        diagnostics.push(Diagnostic::error(
                            format!("nodes '{a}' and '{b}' both write '{key}' and may run concurrently"),
                            format!("nodes.{a}"),
                        ));
                    }
                }
            }
        }

        diagnostics
    }

    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let diagnostics = self.validate();
        if diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
        {
            return Err(GraphError::invalid_graph(diagnostics));
        }
        for warning in &diagnostics {
            tracing::debug!(graph = %self.name, message = %warning.message, "graph compile warning");
        }

        let static_scope = static_reachable(&self.edges);
        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        let mut join_degree: HashMap<String, usize> = HashMap::new();
        let mut entries = Vec::new();
        for (from, to) in &self.edges {
            if to == END {
                continue;
            }
            if from == START {
                entries.push(to.clone());
                continue;
            }
            successors.entry(from.clone()).or_default().push(to.clone());
            if static_scope.contains(from) {
                *join_degree.entry(to.clone()).or_default() += 1;
            }
        }
        // An entry node that also has static predecessors waits for them.
        entries.retain(|node| join_degree.get(node).copied().unwrap_or(0) == 0);

        let nodes = self
            .nodes
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect::<HashMap<_, _>>();
        let conditional = self.conditional.into_iter().collect::<HashMap<_, _>>();

        Ok(CompiledGraph::new(
            self.name,
            nodes,
            successors,
            join_degree,
            conditional,
            entries,
            static_scope,
        ))
    }
}

fn find_static_cycle(edges: &[(String, String)]) -> Option<String> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        if from == START || to == END {
            continue;
        }
        in_degree.entry(from.as_str()).or_default();
        *in_degree.entry(to.as_str()).or_default() += 1;
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
    }
    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut visited = 0usize;
    while let Some(node) = queue.pop_front() {
        visited += 1;
        for next in adjacency.get(node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }
    if visited == in_degree.len() {
        return None;
    }
    let mut remaining = in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(node, _)| node.to_string())
        .collect::<Vec<_>>();
    remaining.sort();
    remaining.into_iter().next()
}

/// Nodes reachable from `start` following static and conditional edges.
fn reachable_from<S>(
    start: &str,
    edges: &[(String, String)],
    conditional: &[(String, ConditionalEdge<S>)],
) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(node) = queue.pop_front() {
        let statics = edges
            .iter()
            .filter(|(from, _)| *from == node)
            .map(|(_, to)| to.clone());
        let routed = conditional
            .iter()
            .filter(|(from, _)| *from == node)
            .flat_map(|(_, edge)| edge.targets.clone());
        for next in statics.chain(routed) {
            if next != END && seen.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Nodes reachable from START through static edges only. These run at most
/// once per run and their static out-edges count toward joins; nodes entered
/// through a router trigger their static successors directly.
fn static_reachable(edges: &[(String, String)]) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([START.to_string()]);
    while let Some(node) = queue.pop_front() {
        for (from, to) in edges {
            if *from == node && to != END && seen.insert(to.clone()) {
                queue.push_back(to.clone());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::fn_node;

    crate::state_record! {
        pub struct Doc {
            a: u32,
            b: u32,
            c: u32,
        }
    }

    fn writer(name: &str, key: &'static str) -> NodeSpec<Doc> {
        NodeSpec::new(name, fn_node(|_state: Doc| async { Ok(Doc::default()) })).writes(&[key])
    }

    #[test]
    fn rejects_concurrent_writers_of_same_key() {
        let err = GraphBuilder::new("overlap")
            .add_node(writer("left", "a"))
            .add_node(writer("right", "a"))
            .add_fan_out(START, &["left", "right"])
            .compile()
            .err()
            .expect("compile should fail");
        let GraphError::InvalidGraph { diagnostics } = err else {
            panic!("expected invalid graph");
        };
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("both write 'a'")));
    }

    #[test]
    fn allows_ordered_writers_of_same_key() {
        let graph = GraphBuilder::new("ordered")
            .add_node(writer("first", "a"))
            .add_node(writer("second", "a"))
            .add_edge(START, "first")
            .add_edge("first", "second");
        assert!(graph
            .validate()
            .iter()
            .all(|d| d.severity != DiagnosticSeverity::Error));
    }

    #[test]
    fn rejects_static_cycles_and_unknown_keys() {
        let cyclic = GraphBuilder::new("cyclic")
            .add_node(writer("x", "a"))
            .add_node(writer("y", "b"))
            .add_edge(START, "x")
            .add_edge("x", "y")
            .add_edge("y", "x");
        assert!(cyclic
            .validate()
            .iter()
            .any(|d| d.message.contains("cycle")));

        let unknown = GraphBuilder::new("unknown")
            .add_node(writer("x", "missing"))
            .add_edge(START, "x");
        assert!(unknown
            .validate()
            .iter()
            .any(|d| d.message.contains("unknown state key 'missing'")));
    }

    #[test]
    fn allows_cycles_through_routers() {
        let graph = GraphBuilder::new("loop")
            .add_node(writer("gen", "a"))
            .add_node(writer("review", "b"))
            .add_node(writer("refine", "a"))
            .add_edge(START, "gen")
            .add_edge("gen", "review")
            .add_edge("refine", "review")
            .add_conditional_edges("review", &["refine", END], |_s: &Doc| END.to_string());
        let diagnostics = graph.validate();
        assert!(
            diagnostics
                .iter()
                .all(|d| d.severity != DiagnosticSeverity::Error),
            "{diagnostics:?}"
        );
    }
}
