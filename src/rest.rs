//! REST action resolution and the REST controller pipeline.
//!
//! The method table maps a request method plus whether the route carried an
//! identity onto one action name:
//!
//! | method | no `id` | `id` |
//! |---|---|---|
//! | `GET`, `HEAD` | `list` | `read` |
//! | `POST` | `create` | |
//! | `PUT` | | `update` |
//! | `DELETE` | | `delete` |
//!
//! Every other combination is unsupported. The same table, read the other
//! way round, yields the `Allow` header for a controller.
//!
//! The pipeline every [`Controller::rest`] runs:
//!
//! ```text
//! ResolveMethod ─▶ ReplyEncoding ─▶ ReplyCharset ─▶ FilterAction ─┬─▶ Action ─▶ EncodeJson ─▶ End
//!                                                               └─▶ RequestEncoding ─▶ DecodeJson ─┘
//! (each failure edge) ─▶ <status node> ─▶ ErrorReply ─▶ EncodeJson
//! ```

use std::sync::LazyLock;

use http::header::ALLOW;
use http::{HeaderValue, Method};
use tracing::debug;

use crate::action::Signal;
use crate::body::{TIMEOUT, decode_json};
use crate::context::Context;
use crate::controller::{Controller, Resolution, controller_action};
use crate::flow::{Fault, Graph, StepResult, Transition, Traversal, on, to};
use crate::header::encode_list;
use crate::media::MediaType;
use crate::negotiate::{CharsetMap, MISMATCH, MediaMap, filter_accept, filter_accept_charset, filter_content_type};
use crate::reply::{encode_json_reply, error_reply};
use crate::status::ReplyStatus;

/// Edge taken when the controller does not implement the resolved action.
pub const ACTION_UNAVAILABLE: &str = "action_unavailable";

// ── Method table ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RestAction {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl RestAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List   => "list",
            Self::Read   => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl AsRef<str> for RestAction {
    fn as_ref(&self) -> &str { self.as_str() }
}

struct Row {
    method: Method,
    identity: bool,
    action: RestAction,
}

static TABLE: [Row; 7] = [
    Row { method: Method::GET,    identity: false, action: RestAction::List },
    Row { method: Method::GET,    identity: true,  action: RestAction::Read },
    Row { method: Method::HEAD,   identity: false, action: RestAction::List },
    Row { method: Method::HEAD,   identity: true,  action: RestAction::Read },
    Row { method: Method::POST,   identity: false, action: RestAction::Create },
    Row { method: Method::PUT,    identity: true,  action: RestAction::Update },
    Row { method: Method::DELETE, identity: true,  action: RestAction::Delete },
];

/// The action for `method` with or without an identity, if any.
pub fn resolve_action(method: &Method, identity: bool) -> Option<RestAction> {
    TABLE.iter()
        .find(|row| row.method == *method && row.identity == identity)
        .map(|row| row.action)
}

/// Methods reaching an action `controller` implements, deduplicated in table
/// order.
pub fn allowed_methods(controller: &Controller) -> Vec<Method> {
    let mut methods: Vec<Method> = Vec::new();
    for row in TABLE.iter().filter(|row| controller.has_action(row.action.as_str())) {
        if !methods.contains(&row.method) {
            methods.push(row.method.clone());
        }
    }
    methods
}

// ── Steps ─────────────────────────────────────────────────────────────────────

/// Step: maps method and identity to an action, records it and selects it on
/// the controller. Leaves on the edge named after the action, or failure.
pub async fn resolve_method(context: Context) -> StepResult<Context> {
    match resolve_action(context.method(), context.has_identity()) {
        Some(action) => {
            let action = action.as_str();
            Ok(Transition::named(action, context.with_selected_action(action)))
        }
        None => Ok(Transition::failure(context)),
    }
}

/// Step: checks the controller implements the selected action.
pub async fn filter_action(context: Context) -> StepResult<Context> {
    let implemented = context.controller()
        .zip(context.action())
        .is_some_and(|(controller, action)| controller.has_action(action));

    match context.action() {
        Some(action) if implemented => {
            let action = action.to_owned();
            Ok(Transition::named(action, context))
        }
        _ => Ok(Transition::named(ACTION_UNAVAILABLE, context)),
    }
}

/// Step: publishes `Allow` and records `action_unavailable`.
pub async fn action_unavailable(context: Context) -> StepResult<Context> {
    let methods = context.controller().map(allowed_methods).unwrap_or_default();
    let names: Vec<&str> = methods.iter().map(Method::as_str).collect();

    let allow = match HeaderValue::try_from(encode_list(&names)) {
        Ok(allow) => allow,
        Err(err) => return Err(Fault::new(context, err)),
    };
    Ok(Transition::default(
        context
            .with_reply(|reply| reply.set_header(ALLOW, allow))
            .with_status(ReplyStatus::ActionUnavailable),
    ))
}

/// Step body shared by the status nodes.
pub async fn respond(context: Context, status: ReplyStatus) -> StepResult<Context> {
    debug!(%status, path = %context.path(), "request ends early");
    Ok(Transition::default(context.with_status(status)))
}

// ── Graph ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RestNode {
    ResolveMethod,
    ReplyEncoding,
    ReplyCharset,
    FilterAction,
    RequestEncoding,
    DecodeJson,
    Action,
    EncodeJson,
    RequestUnsupported,
    RequestMalformed,
    MimeUnsupported,
    ActionUnavailable,
    ResourceMissing,
    ResourceMismatch,
    ServiceUnavailable,
    AuthMalformed,
    AuthFailed,
    Timeout,
    ErrorReply,
    End,
}

static GRAPH: LazyLock<Graph<RestNode, Context>> = LazyLock::new(graph);

fn graph() -> Graph<RestNode, Context> {
    use RestNode::*;

    let json = MediaMap::new([(MediaType::json(), "json")]);
    let utf8 = CharsetMap::new([("utf-8", "utf-8")]);
    let status = |status: ReplyStatus| move |context: Context| respond(context, status);

    Graph::new()
        .node(ResolveMethod, resolve_method, [to(ReplyEncoding), to(RequestUnsupported)])
        .node(ReplyEncoding, filter_accept(json.clone()), [to(ReplyCharset), to(ResourceMismatch)])
        .node(ReplyCharset, filter_accept_charset(utf8), [to(FilterAction), to(ResourceMismatch)])
        .node(FilterAction, filter_action, [
            on(RestAction::Create.as_str(), RequestEncoding),
            on(RestAction::Update.as_str(), RequestEncoding),
            on(ACTION_UNAVAILABLE, ActionUnavailable),
            to(Action),
        ])
        .node(RequestEncoding, filter_content_type(json), [
            on(MISMATCH, MimeUnsupported),
            to(DecodeJson),
            to(RequestMalformed),
        ])
        .node(DecodeJson, decode_json, [on(TIMEOUT, Timeout), to(Action), to(RequestMalformed)])
        .node(Action, controller_action, [
            on(Signal::Malformed.as_str(), RequestMalformed),
            on(Signal::NotFound.as_str(), ResourceMissing),
            on(Signal::NoAction.as_str(), ActionUnavailable),
            on(Signal::NoAuth.as_str(), AuthMalformed),
            on(Signal::AuthFailed.as_str(), AuthFailed),
            on(Signal::Unavailable.as_str(), ServiceUnavailable),
            on(Signal::Mismatch.as_str(), ResourceMismatch),
            on(Signal::Timeout.as_str(), Timeout),
            to(EncodeJson),
        ])
        .node(RequestUnsupported, status(ReplyStatus::RequestUnsupported), [to(ErrorReply)])
        .node(RequestMalformed, status(ReplyStatus::RequestMalformed), [to(ErrorReply)])
        .node(MimeUnsupported, status(ReplyStatus::MimeUnsupported), [to(ErrorReply)])
        .node(ActionUnavailable, action_unavailable, [to(ErrorReply)])
        .node(ResourceMissing, status(ReplyStatus::ResourceMissing), [to(ErrorReply)])
        .node(ResourceMismatch, status(ReplyStatus::ResourceMismatch), [to(ErrorReply)])
        .node(ServiceUnavailable, status(ReplyStatus::ServiceUnavailable), [to(ErrorReply)])
        .node(AuthMalformed, status(ReplyStatus::AuthMalformed), [to(ErrorReply)])
        .node(AuthFailed, status(ReplyStatus::AuthFailed), [to(ErrorReply)])
        .node(Timeout, status(ReplyStatus::Timeout), [to(ErrorReply)])
        .node(ErrorReply, error_reply, [to(EncodeJson)])
        .node(EncodeJson, encode_json_reply, [to(End)])
}

/// Runs the REST pipeline and keeps the whole traversal.
pub async fn traverse(context: Context) -> Traversal<RestNode, Context> {
    GRAPH.run(RestNode::ResolveMethod, context).await
}

/// Runs the REST pipeline. This is the `resolve` of [`Controller::rest`].
pub async fn resolve(context: Context) -> Resolution {
    let traversal = traverse(context).await;
    debug!(path = ?traversal.path, "rest pipeline done");

    match traversal.error {
        Some(error) => Err(Fault { context: traversal.context, error }),
        None => Ok(traversal.context),
    }
}
