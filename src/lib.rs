//! # switchyard
//!
//! A protocol-layer request dispatcher for HTTP services. Routing, content
//! negotiation, REST action resolution and reply encoding, with every request
//! path recorded as it goes.
//!
//! ## The contract
//!
//! Every request runs through a [`Graph`](flow::Graph): a table of named
//! steps and labelled edges. A step takes the [`Context`] by value, returns a
//! new one and names the edge to follow. The engine records every node it
//! visits, so the path a request took is available to logs and tests.
//!
//! Expected outcomes are never errors. No route, an unsupported method, an
//! unacceptable `Accept`, a malformed body, a missing resource: each is an
//! edge leading to a node that records a [`ReplyStatus`], which maps to
//! exactly one HTTP code. Only an action that fails, or a view that cannot be
//! encoded, raises a [`Fault`](flow::Fault). It is caught once, logged, and
//! answered with `500`.
//!
//! What stays outside: TLS, rate limiting, sessions, templating and
//! persistence.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use switchyard::{ActionResult, App, Context, Controller, Error, Router, Server, Signal};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let users = Controller::rest()
//!         .on("list", list_users)
//!         .on("read", read_user);
//!
//!     let app = App::new(Router::new().rest("/users/:id?", users));
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn list_users(ctx: Context) -> Result<ActionResult, Error> {
//!     Ok(ActionResult::ok(ctx.with_view(json!([{ "id": "1" }]))))
//! }
//!
//! async fn read_user(ctx: Context) -> Result<ActionResult, Error> {
//!     match ctx.params().and_then(|p| p.str("id")) {
//!         Some("1") => Ok(ActionResult::ok(ctx.with_view(json!({ "id": "1" })))),
//!         _ => Ok(ActionResult::signal(Signal::NotFound, ctx)),
//!     }
//! }
//! ```

mod action;
mod body;
mod config;
mod context;
mod controller;
mod cors;
mod error;
mod media;
mod pipeline;
mod reply;
mod router;
mod server;
mod status;

pub mod flow;
pub mod header;
pub mod negotiate;
pub mod rest;

pub use action::{Action, ActionResult, Signal};
pub use body::{Body, BodyError, read_body};
pub use config::Config;
pub use context::{Attributes, Context, RequestHead};
pub use controller::{Controller, Resolution};
pub use cors::{CorsOrigin, encode_cors_origin, encode_cors_preflight};
pub use error::{BoxError, Error};
pub use media::MediaType;
pub use pipeline::{App, RequestNode};
pub use reply::{Reply, send_html_reply, send_json_reply, send_text_reply};
pub use router::{NoRoute, ParamValue, RouteData, RouteMatch, RouteParams, Router};
pub use server::Server;
pub use status::{ReplyStatus, code_of_status, message_of_code};
