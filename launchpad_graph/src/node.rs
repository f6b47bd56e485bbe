use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::state::StateRecord;

/// A unit of work in a graph.
///
/// A node receives a snapshot of the shared state and returns a partial record
/// holding only the keys it produces. Returning `Err` means nothing is
/// committed and the node's descendants are skipped.
#[async_trait]
pub trait Node<S: StateRecord>: Send + Sync {
    async fn run(&self, state: &S) -> Result<S>;
}

/// Registration entry: the node plus the keys it reads and writes.
pub struct NodeSpec<S: StateRecord> {
    pub name: String,
    pub reads: Vec<&'static str>,
    pub writes: Vec<&'static str>,
    pub node: Arc<dyn Node<S>>,
}

impl<S: StateRecord> Clone for NodeSpec<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            reads: self.reads.clone(),
            writes: self.writes.clone(),
            node: self.node.clone(),
        }
    }
}

impl<S: StateRecord> NodeSpec<S> {
    pub fn new(name: impl Into<String>, node: impl Node<S> + 'static) -> Self {
        Self {
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            node: Arc::new(node),
        }
    }

    pub fn from_arc(name: impl Into<String>, node: Arc<dyn Node<S>>) -> Self {
        Self {
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            node,
        }
    }

    pub fn reads(mut self, keys: &[&'static str]) -> Self {
        self.reads.extend_from_slice(keys);
        self
    }

    pub fn writes(mut self, keys: &[&'static str]) -> Self {
        self.writes.extend_from_slice(keys);
        self
    }
}

/// Adapter turning an async closure over an owned state snapshot into a node.
pub struct FnNode<S, F> {
    f: F,
    _state: PhantomData<fn(S)>,
}

pub fn fn_node<S, F, Fut>(f: F) -> FnNode<S, F>
where
    S: StateRecord,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S>> + Send,
{
    FnNode {
        f,
        _state: PhantomData,
    }
}

#[async_trait]
impl<S, F, Fut> Node<S> for FnNode<S, F>
where
    S: StateRecord,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S>> + Send,
{
    async fn run(&self, state: &S) -> Result<S> {
        (self.f)(state.clone()).await
    }
}

/// Run blocking work (HTML parsing, rendering, file encoding) on the blocking
/// pool so node tasks keep the runtime responsive.
pub async fn offload<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| GraphError::internal(format!("blocking task failed: {err}")))
}
