//! Controllers and action dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use http::HeaderValue;
use http::header::LOCATION;
use tracing::debug;

use crate::action::{Action, ActionResult, BoxedAction, Signal};
use crate::context::Context;
use crate::flow::{BoxFuture, Fault, StepResult, Transition};

/// Outcome of a controller's own sub-pipeline.
pub type Resolution = Result<Context, Fault<Context>>;

type Resolve = Arc<dyn Fn(Context) -> BoxFuture<'static, Resolution> + Send + Sync + 'static>;

/// A named bundle of actions plus the sub-pipeline that drives them.
///
/// Controllers are values: [`Controller::select`] returns a new controller
/// with a different active action and leaves the original as it was. Clones
/// share the action table.
#[derive(Clone)]
pub struct Controller {
    resolve: Resolve,
    actions: Arc<BTreeMap<String, BoxedAction>>,
    selected: Option<String>,
}

impl Controller {
    /// A controller driven by the REST action pipeline.
    pub fn rest() -> Self {
        Self::with_resolve(crate::rest::resolve)
    }

    /// A controller with a custom sub-pipeline.
    pub fn with_resolve<F, Fut>(resolve: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Resolution> + Send + 'static,
    {
        Self {
            resolve: Arc::new(move |context| Box::pin(resolve(context))),
            actions: Arc::new(BTreeMap::new()),
            selected: None,
        }
    }

    /// Registers `action` under `name`. Returns `self` for chaining.
    pub fn on(mut self, name: impl AsRef<str>, action: impl Action) -> Self {
        Arc::make_mut(&mut self.actions)
            .insert(name.as_ref().to_owned(), action.into_boxed_action());
        self
    }

    /// A copy of this controller with `name` as the active action.
    pub fn select(&self, name: &str) -> Self {
        Self { selected: Some(name.to_owned()), ..self.clone() }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// The active action, if one is selected and implemented.
    pub fn action(&self) -> Option<&BoxedAction> {
        self.actions.get(self.selected.as_deref()?)
    }

    /// Runs the controller's sub-pipeline over `context`.
    pub fn resolve(&self, context: Context) -> BoxFuture<'static, Resolution> {
        (self.resolve)(context)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

/// Step: invokes the selected action and classifies its result.
///
/// A continuation leaves on the edge named by its target. A reply or
/// redirect sets the reply code (and `Location`) and leaves on the default
/// edge. A failing action is not caught: it faults the traversal here.
pub async fn controller_action(context: Context) -> StepResult<Context> {
    let Some(action) = context.controller().and_then(Controller::action).cloned() else {
        return Ok(Transition::named(Signal::NoAction.as_str(), context));
    };

    let result = match action.call(context.clone()).await {
        Ok(result) => result,
        Err(err) => return Err(Fault::new(context, err)),
    };

    match result {
        ActionResult::Continuation { target, context } => {
            debug!(%target, "action continues");
            Ok(Transition::named(target, context))
        }
        ActionResult::Reply { code, context } => {
            Ok(Transition::default(context.with_reply(|reply| reply.set_status(code))))
        }
        ActionResult::Redirect { code, location, context } => {
            let location = match HeaderValue::try_from(location) {
                Ok(location) => location,
                Err(err) => return Err(Fault::new(context, err)),
            };
            Ok(Transition::default(context.with_reply(|reply| {
                reply.set_status(code);
                reply.set_header(LOCATION, location);
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http_body_util::Empty;
    use bytes::Bytes;

    use super::*;
    use crate::error::Error;
    use crate::flow::Edge;
    use crate::router::{RouteMatch, RouteParams};

    async fn found(ctx: Context) -> Result<ActionResult, Error> {
        Ok(ActionResult::reply(StatusCode::CREATED, ctx))
    }

    async fn moved(ctx: Context) -> Result<ActionResult, Error> {
        Ok(ActionResult::redirect(StatusCode::SEE_OTHER, "/users/9", ctx))
    }

    async fn missing(ctx: Context) -> Result<ActionResult, Error> {
        Ok(ActionResult::signal(Signal::NotFound, ctx))
    }

    async fn broken(_: Context) -> Result<ActionResult, Error> {
        Err(Error::action("database gone"))
    }

    fn routed(controller: Controller, action: &str) -> Context {
        let request = http::Request::get("/users/1").body(Empty::<Bytes>::new()).unwrap();
        Context::from_request(request)
            .with_route(RouteMatch::new(controller, RouteParams::default()))
            .with_selected_action(action)
    }

    fn controller() -> Controller {
        Controller::rest()
            .on("create", found)
            .on("update", moved)
            .on("read", missing)
            .on("delete", broken)
    }

    #[test]
    fn select_returns_a_new_value() {
        let base = controller();
        let picked = base.select("read");
        assert_eq!(base.selected(), None);
        assert_eq!(picked.selected(), Some("read"));
        assert!(picked.action().is_some());
        assert!(base.select("list").action().is_none());
    }

    #[tokio::test]
    async fn reply_sets_code() {
        let t = controller_action(routed(controller(), "create")).await.unwrap();
        assert_eq!(t.edge, Edge::Default);
        assert_eq!(t.context.reply().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn redirect_sets_location() {
        let t = controller_action(routed(controller(), "update")).await.unwrap();
        assert_eq!(t.context.reply().status(), StatusCode::SEE_OTHER);
        assert_eq!(t.context.reply().header(LOCATION), Some("/users/9"));
    }

    #[tokio::test]
    async fn continuation_names_the_edge() {
        let t = controller_action(routed(controller(), "read")).await.unwrap();
        assert_eq!(t.edge, Edge::Named("not_found".into()));
    }

    #[tokio::test]
    async fn unimplemented_action_is_no_action() {
        let t = controller_action(routed(controller(), "list")).await.unwrap();
        assert_eq!(t.edge, Edge::Named("no_action".into()));
    }

    #[tokio::test]
    async fn failing_action_faults() {
        let fault = controller_action(routed(controller(), "delete")).await.unwrap_err();
        assert!(fault.error.to_string().contains("database gone"));
        assert_eq!(fault.context.action(), Some("delete"));
    }
}
