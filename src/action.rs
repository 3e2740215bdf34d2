//! Controller actions, their results, and type erasure.
//!
//! # How actions are stored
//!
//! A controller maps action names to functions of different concrete types.
//! Each one is wrapped once at registration and stored as a
//! [`BoxedAction`] (`Arc<dyn ErasedAction>`), so calling it at request time
//! costs one `Arc` clone and one virtual call:
//!
//! ```text
//! async fn read(ctx: Context) -> Result<ActionResult, E> { … }
//!        ↓ Controller::rest().on("read", read)
//! read.into_boxed_action()                  ← Action blanket impl
//!        ↓  stored as BoxedAction
//! action.call(ctx)  at request time         ← one vtable dispatch
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use http::StatusCode;

use crate::context::Context;
use crate::error::Error;
use crate::flow::BoxFuture;

// ── Results ───────────────────────────────────────────────────────────────────

/// What an action hands back. The tag is explicit; nothing is inferred from
/// which fields happen to be present.
#[derive(Debug)]
pub enum ActionResult {
    /// The action produced the response itself.
    Reply { code: StatusCode, context: Context },
    /// A 3xx response pointing at `location`.
    Redirect { code: StatusCode, location: String, context: Context },
    /// Re-enter the pipeline at the node labelled `target`.
    Continuation { target: Cow<'static, str>, context: Context },
}

impl ActionResult {
    /// A direct reply. `code` must not be a 3xx; use [`redirect`](Self::redirect).
    pub fn reply(code: StatusCode, context: Context) -> Self {
        debug_assert!(!code.is_redirection(), "reply with redirect code {code}");
        Self::Reply { code, context }
    }

    pub fn ok(context: Context) -> Self {
        Self::Reply { code: StatusCode::OK, context }
    }

    /// A redirect. `code` must be a 3xx.
    pub fn redirect(code: StatusCode, location: impl Into<String>, context: Context) -> Self {
        debug_assert!(code.is_redirection(), "redirect with non-redirect code {code}");
        Self::Redirect { code, location: location.into(), context }
    }

    pub fn continuation(target: impl Into<Cow<'static, str>>, context: Context) -> Self {
        Self::Continuation { target: target.into(), context }
    }

    /// Continuation to one of the pipeline's well-known signal nodes.
    pub fn signal(signal: Signal, context: Context) -> Self {
        Self::continuation(signal.as_str(), context)
    }

    pub fn context(&self) -> &Context {
        match self {
            Self::Reply { context, .. }
            | Self::Redirect { context, .. }
            | Self::Continuation { context, .. } => context,
        }
    }
}

/// Domain-level outcomes an action can report without knowing HTTP codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
    Malformed,
    NotFound,
    NoAction,
    NoAuth,
    AuthFailed,
    Unavailable,
    Mismatch,
    Timeout,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed   => "malformed",
            Self::NotFound    => "not_found",
            Self::NoAction    => "no_action",
            Self::NoAuth      => "no_auth",
            Self::AuthFailed  => "auth_failed",
            Self::Unavailable => "unavailable",
            Self::Mismatch    => "mismatch",
            Self::Timeout     => "timeout",
        }
    }
}

// ── Erasure ───────────────────────────────────────────────────────────────────

pub(crate) type ActionFuture = BoxFuture<'static, Result<ActionResult, Error>>;

#[doc(hidden)]
pub trait ErasedAction {
    fn call(&self, context: Context) -> ActionFuture;
}

#[doc(hidden)]
pub type BoxedAction = Arc<dyn ErasedAction + Send + Sync + 'static>;

/// Implemented for every valid controller action:
///
/// ```text
/// async fn name(ctx: Context) -> Result<ActionResult, E>   where E: Into<Error>
/// ```
///
/// Sealed; only the blanket impl below satisfies it.
pub trait Action: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_action(self) -> BoxedAction;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, E> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionResult, E>> + Send + 'static,
    E: Into<Error> + 'static,
{
}

impl<F, Fut, E> Action for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionResult, E>> + Send + 'static,
    E: Into<Error> + 'static,
{
    fn into_boxed_action(self) -> BoxedAction {
        Arc::new(FnAction(self))
    }
}

struct FnAction<F>(F);

impl<F, Fut, E> ErasedAction for FnAction<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionResult, E>> + Send + 'static,
    E: Into<Error> + 'static,
{
    fn call(&self, context: Context) -> ActionFuture {
        let fut = (self.0)(context);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::Empty;

    use super::*;

    fn context() -> Context {
        Context::from_request(http::Request::new(Empty::<Bytes>::new()))
    }

    #[test]
    fn constructors_keep_their_code() {
        let redirect = ActionResult::redirect(StatusCode::FOUND, "/next", context());
        assert!(matches!(redirect, ActionResult::Redirect { code, .. } if code == StatusCode::FOUND));

        let reply = ActionResult::reply(StatusCode::ACCEPTED, context());
        assert!(matches!(reply, ActionResult::Reply { code, .. } if code == StatusCode::ACCEPTED));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reply with redirect code")]
    fn reply_rejects_redirect_code() {
        let _ = ActionResult::reply(StatusCode::MOVED_PERMANENTLY, context());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "redirect with non-redirect code")]
    fn redirect_rejects_other_codes() {
        let _ = ActionResult::redirect(StatusCode::OK, "/next", context());
    }
}
