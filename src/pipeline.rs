//! The request pipeline and its outer boundary.
//!
//! ```text
//! Route ──▶ Cors ──▶ Controller ──▶ Log ──▶ Send ──▶ End
//!   │         │          │           ▲
//!   │         │          └─▶ Error ──┤
//!   │         └─▶ Preflight ─────────┤
//!   └─▶ NoRoute ─────────────────────┘
//! ```
//!
//! Expected outcomes travel as edges. The only unexpected one, a [`Fault`],
//! is caught once: by the `Controller` node for faults raised inside a
//! controller, or by [`App::handle`] for anything else. Either way the
//! client gets `500 - Internal Server Error` and the fault is logged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::VARY;
use http::{Method, StatusCode};
use tracing::{debug, error, warn};

use crate::body::DEFAULT_TIMEOUT;
use crate::context::Context;
use crate::cors::{CorsOrigin, encode_cors_origin, encode_cors_preflight};
use crate::flow::{Fault, Graph, StepResult, Transition, Traversal, on, to};
use crate::reply::{Reply, send_text_reply};
use crate::router::Router;
use crate::status::ReplyStatus;

const NO_ROUTE: &str = "no_route";
const PREFLIGHT: &str = "preflight";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RequestNode {
    Route,
    NoRoute,
    Cors,
    Preflight,
    Controller,
    Error,
    Log,
    Send,
    End,
}

// ── Steps ─────────────────────────────────────────────────────────────────────

async fn route(router: Arc<Router>, context: Context) -> StepResult<Context> {
    match router.resolve(context.method(), context.uri()) {
        Ok(matched) => Ok(Transition::default(context.with_route(matched))),
        Err(no_route) => Ok(Transition::named(NO_ROUTE, context.with_error(no_route.to_string()))),
    }
}

async fn no_route(context: Context) -> StepResult<Context> {
    let context = context.with_status(ReplyStatus::EndpointUnavailable);
    let code = ReplyStatus::EndpointUnavailable.code();
    Ok(Transition::default(context.with_reply(|reply| send_text_reply(reply, code))))
}

async fn cors(origins: Arc<[CorsOrigin]>, context: Context) -> StepResult<Context> {
    if context.method() == Method::OPTIONS {
        return Ok(Transition::named(PREFLIGHT, context));
    }
    Ok(Transition::default(encode_cors_origin(&origins, context)))
}

async fn preflight(origins: Arc<[CorsOrigin]>, context: Context) -> StepResult<Context> {
    Ok(Transition::default(encode_cors_preflight(&origins, context)))
}

/// Runs the matched controller's own pipeline. A fault inside it becomes an
/// error context on the failure edge.
async fn controller(context: Context) -> StepResult<Context> {
    let Some(controller) = context.controller().cloned() else {
        return Ok(Transition::failure(context.with_error("no controller")));
    };

    match controller.resolve(context).await {
        Ok(context) => Ok(Transition::success(context)),
        Err(Fault { context, error: fault }) => {
            error!(error = %fault, action = ?context.action(), path = %context.path(), "controller fault");
            Ok(Transition::failure(context.with_error(fault.to_string())))
        }
    }
}

async fn error_reply(context: Context) -> StepResult<Context> {
    Ok(Transition::default(internal_error(context)))
}

async fn log(context: Context) -> StepResult<Context> {
    let status = context.reply().status().as_u16();
    let reason = context.status().map(ReplyStatus::description);
    match context.error() {
        Some(error) => warn!(method = %context.method(), path = %context.path(), status, reason, error, "request failed"),
        None => debug!(method = %context.method(), path = %context.path(), status, reason, "request done"),
    }
    Ok(Transition::default(context))
}

async fn send(context: Context) -> StepResult<Context> {
    Ok(Transition::default(context.with_reply(Reply::end)))
}

/// Replaces whatever was written with a plain `500` reply. CORS headers
/// already granted survive.
fn internal_error(context: Context) -> Context {
    context
        .with_status(ReplyStatus::Error)
        .with_reply(|reply| {
            let mut fresh = Reply::new();
            for (name, value) in reply.headers() {
                if name.as_str().starts_with("access-control-") || *name == VARY {
                    fresh.set_header(name.clone(), value.clone());
                }
            }
            send_text_reply(&mut fresh, StatusCode::INTERNAL_SERVER_ERROR);
            *reply = fresh;
        })
}

fn graph(router: Arc<Router>, origins: Arc<[CorsOrigin]>) -> Graph<RequestNode, Context> {
    use RequestNode::*;

    let cors_origins = Arc::clone(&origins);

    Graph::new()
        .node(Route, move |c| route(Arc::clone(&router), c), [on(NO_ROUTE, NoRoute), to(Cors)])
        .node(NoRoute, no_route, [to(Log)])
        .node(Cors, move |c| cors(Arc::clone(&cors_origins), c), [on(PREFLIGHT, Preflight), to(Controller)])
        .node(Preflight, move |c| preflight(Arc::clone(&origins), c), [to(Log)])
        .node(RequestNode::Controller, controller, [to(Log), to(Error)])
        .node(Error, error_reply, [to(Log)])
        .node(Log, log, [to(Send)])
        .node(Send, send, [to(End)])
}

// ── App ───────────────────────────────────────────────────────────────────────

/// A router, its CORS allow-list and the compiled request pipeline.
///
/// Build it once at startup and share it: handling a request only reads it.
#[derive(Clone)]
pub struct App {
    router: Arc<Router>,
    origins: Arc<[CorsOrigin]>,
    body_timeout: Duration,
    graph: Arc<Graph<RequestNode, Context>>,
}

impl App {
    pub fn new(router: Router) -> Self {
        let router = Arc::new(router);
        let origins: Arc<[CorsOrigin]> = Arc::from(Vec::new());
        let graph = Arc::new(graph(Arc::clone(&router), Arc::clone(&origins)));
        Self { router, origins, body_timeout: DEFAULT_TIMEOUT, graph }
    }

    /// Replaces the CORS allow-list.
    pub fn cors(mut self, origins: impl IntoIterator<Item = CorsOrigin>) -> Self {
        self.origins = origins.into_iter().collect();
        self.graph = Arc::new(graph(Arc::clone(&self.router), Arc::clone(&self.origins)));
        self
    }

    /// Time allowed for reading a request body.
    pub fn body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration { self.body_timeout }

    /// Runs the request pipeline and keeps the whole traversal.
    pub async fn traverse(&self, context: Context) -> Traversal<RequestNode, Context> {
        self.graph.run(RequestNode::Route, context).await
    }

    /// Handles one request. Never fails: a fault that escaped the pipeline
    /// is logged and answered with a `500`. The returned reply is ended.
    pub async fn handle(&self, context: Context) -> Context {
        let traversal = self.traverse(context).await;

        let context = match traversal.error {
            None => traversal.context,
            Some(fault) => {
                error!(error = %fault, node = ?traversal.id, path = %traversal.context.path(), "unhandled fault");
                internal_error(traversal.context.with_error(fault.to_string()))
            }
        };
        context.with_reply(Reply::end)
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("router", &self.router)
            .field("origins", &self.origins)
            .field("body_timeout", &self.body_timeout)
            .finish_non_exhaustive()
    }
}
