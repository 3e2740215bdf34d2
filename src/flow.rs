//! Labelled state-transition engine.
//!
//! Every pipeline in switchyard is a [`Graph`]: a table of nodes, each with
//! an async step and an ordered list of outgoing [`Target`]s. The driver loop
//! calls the current node's step, follows the [`Edge`] it returns and records
//! every visited node id, so the full path a request took is available to
//! logs and tests.
//!
//! ```text
//! step(context) ──▶ Transition { edge, context }
//!                          │
//!        Named(n) ──▶ target labelled `n`
//!        Success  ──▶ target labelled "success"
//!        Failure  ──▶ target labelled "failure"
//!        otherwise ─▶ first unlabelled target (last one for Failure)
//! ```
//!
//! The engine forwards whatever context a step returns. It never inspects
//! error semantics: a step that wants an error reply sets it on the context
//! and picks an edge. Only a [`Fault`] stops the traversal early.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use tracing::trace;

use crate::error::Error;

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a step produces: an edge to follow, or an unhandled fault.
pub type StepResult<C> = Result<Transition<C>, Fault<C>>;

type BoxedStep<C> = Arc<dyn Fn(C) -> BoxFuture<'static, StepResult<C>> + Send + Sync + 'static>;

const SUCCESS: &str = "success";
const FAILURE: &str = "failure";

// ── Edges ─────────────────────────────────────────────────────────────────────

/// The way a step leaves its node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Edge {
    Success,
    /// Pass-through; resolves like `Success` but never matches the
    /// `"success"` label.
    Default,
    Failure,
    Named(Cow<'static, str>),
}

/// The outcome of one successful step: the edge to follow and the context
/// handed to the next node.
#[derive(Debug)]
pub struct Transition<C> {
    pub edge: Edge,
    pub context: C,
}

impl<C> Transition<C> {
    pub fn success(context: C) -> Self {
        Self { edge: Edge::Success, context }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn default(context: C) -> Self {
        Self { edge: Edge::Default, context }
    }

    /// Takes the failure edge. This does not mark the context as failed;
    /// callers set the error explicitly when one is meant.
    pub fn failure(context: C) -> Self {
        Self { edge: Edge::Failure, context }
    }

    pub fn named(name: impl Into<Cow<'static, str>>, context: C) -> Self {
        Self { edge: Edge::Named(name.into()), context }
    }
}

/// An unhandled fault raised by a step, carrying the context the step was
/// given.
#[derive(Debug)]
pub struct Fault<C> {
    pub context: C,
    pub error: Error,
}

impl<C> Fault<C> {
    pub fn new(context: C, error: impl Into<Error>) -> Self {
        Self { context, error: error.into() }
    }
}

/// An outgoing edge declaration: the node to visit next, optionally guarded
/// by a label.
#[derive(Clone, Copy, Debug)]
pub struct Target<N> {
    id: N,
    label: Option<&'static str>,
}

/// Unlabelled target.
pub fn to<N>(id: N) -> Target<N> {
    Target { id, label: None }
}

/// Target taken only by an edge carrying `label`.
pub fn on<N>(label: &'static str, id: N) -> Target<N> {
    Target { id, label: Some(label) }
}

// ── Graph ─────────────────────────────────────────────────────────────────────

struct Node<N, C> {
    step: BoxedStep<C>,
    targets: Vec<Target<N>>,
}

/// A step map keyed by node id.
///
/// Built once at startup and only read afterwards, so one graph can drive
/// any number of concurrent traversals.
pub struct Graph<N, C> {
    nodes: HashMap<N, Node<N, C>>,
}

impl<N, C> Graph<N, C>
where
    N: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    C: Send + 'static,
{
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    /// Adds a node. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already declared.
    pub fn node<F, Fut>(
        mut self,
        id: N,
        step: F,
        targets: impl IntoIterator<Item = Target<N>>,
    ) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult<C>> + Send + 'static,
    {
        let step: BoxedStep<C> = Arc::new(move |context| Box::pin(step(context)));
        let node = Node { step, targets: targets.into_iter().collect() };

        if self.nodes.insert(id, node).is_some() {
            panic!("node {id:?} declared twice");
        }
        self
    }

    /// Resolves `edge` against the targets of node `from`.
    pub fn select(&self, from: N, edge: &Edge) -> Option<N> {
        let targets = &self.nodes.get(&from)?.targets;
        let labelled = |label: &str| targets.iter().find(|t| t.label == Some(label));
        let mut unlabelled = targets.iter().filter(|t| t.label.is_none());

        let target = match edge {
            Edge::Named(name) => labelled(name.as_ref()).or_else(|| unlabelled.next()),
            Edge::Success => labelled(SUCCESS).or_else(|| unlabelled.next()),
            Edge::Default => unlabelled.next(),
            Edge::Failure => labelled(FAILURE).or_else(|| unlabelled.last()),
        };
        target.map(|t| t.id)
    }

    /// Drives `context` through the graph starting at `start`.
    ///
    /// Ends when the selected target has no node of its own, when no target
    /// matches the returned edge, or when a step faults.
    pub async fn run(&self, start: N, mut context: C) -> Traversal<N, C> {
        let mut path = Vec::new();
        let mut current = start;

        loop {
            let Some(node) = self.nodes.get(&current) else {
                return Traversal { id: current, path, context, error: None };
            };
            path.push(current);

            match (node.step)(context).await {
                Ok(transition) => {
                    trace!(node = ?current, edge = ?transition.edge, "step");
                    context = transition.context;

                    match self.select(current, &transition.edge) {
                        Some(next) => current = next,
                        None => return Traversal { id: current, path, context, error: None },
                    }
                }
                Err(fault) => {
                    trace!(node = ?current, error = %fault.error, "fault");
                    return Traversal {
                        id: current,
                        path,
                        context: fault.context,
                        error: Some(fault.error),
                    };
                }
            }
        }
    }
}

impl<N, C> Default for Graph<N, C>
where
    N: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    C: Send + 'static,
{
    fn default() -> Self { Self::new() }
}

/// The record of one run through a [`Graph`].
#[derive(Debug)]
pub struct Traversal<N, C> {
    /// Where the traversal stopped: a terminal target, or the faulting node.
    pub id: N,
    /// Every node whose step ran, in order.
    pub path: Vec<N>,
    pub context: C,
    pub error: Option<Error>,
}

impl<N, C> Traversal<N, C> {
    pub fn is_fault(&self) -> bool {
        self.error.is_some()
    }
}
