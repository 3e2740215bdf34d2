//! The value threaded through every pipeline step.
//!
//! A [`Context`] is never mutated in place. Steps take it by value and hand
//! back a new one built with the consuming `with_*` constructors, so a
//! context captured by one step cannot observe what a later step did. The
//! request head is shared behind an `Arc`; everything a step may change is
//! cheap to clone.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};

use crate::body::Body;
use crate::controller::Controller;
use crate::reply::Reply;
use crate::router::{RouteMatch, RouteParams};
use crate::status::ReplyStatus;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

// ── Request head ──────────────────────────────────────────────────────────────

/// The immutable part of an inbound request.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote: IpAddr,
    pub received: SystemTime,
}

// ── Attributes ────────────────────────────────────────────────────────────────

/// Protocol-layer hints accumulated along the way.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes {
    /// Resolved REST action name.
    pub action: Option<String>,
    /// Outcome chosen by the step that ended the request.
    pub status: Option<ReplyStatus>,
    /// Route template that matched.
    pub endpoint: Option<String>,
    /// Anything a route or controller wants to pass along.
    pub extra: BTreeMap<String, String>,
}

impl Attributes {
    /// Overlays `other` on `self`: set fields win, `extra` entries merge key
    /// by key.
    pub fn merge(mut self, other: Attributes) -> Self {
        if other.action.is_some() {
            self.action = other.action;
        }
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.endpoint.is_some() {
            self.endpoint = other.endpoint;
        }
        self.extra.extend(other.extra);
        self
    }
}

/// Routing state attached once the router has matched.
#[derive(Clone, Debug)]
pub struct Routed {
    pub controller: Controller,
    pub params: RouteParams,
}

// ── Context ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Context {
    head: Arc<RequestHead>,
    body: Body,
    reply: Reply,
    attributes: Attributes,
    routed: Option<Routed>,
    request_body: Option<Value>,
    view: Value,
    error: Option<String>,
}

impl Context {
    pub fn new(head: RequestHead, body: Body) -> Self {
        Self {
            head: Arc::new(head),
            body,
            reply: Reply::new(),
            attributes: Attributes::default(),
            routed: None,
            request_body: None,
            view: Value::Object(Map::new()),
            error: None,
        }
    }

    /// Builds a context for a request accepted from `peer`.
    pub fn incoming<B>(request: http::Request<B>, peer: Option<SocketAddr>, timeout: Duration) -> Self
    where
        B: hyper::body::Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<crate::error::BoxError>,
    {
        let (parts, body) = request.into_parts();
        let remote = forwarded_for(&parts.headers)
            .or(peer.map(|addr| addr.ip()))
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let head = RequestHead {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            remote,
            received: SystemTime::now(),
        };
        Self::new(head, Body::new(body, timeout))
    }

    /// Builds a context with no known peer and the default body timeout.
    pub fn from_request<B>(request: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<crate::error::BoxError>,
    {
        Self::incoming(request, None, crate::body::DEFAULT_TIMEOUT)
    }

    // ── Request ──

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn remote(&self) -> IpAddr { self.head.remote }
    pub fn received(&self) -> SystemTime { self.head.received }
    pub fn body(&self) -> &Body { &self.body }

    /// Header value as a string. Missing and non-ASCII values are `None`.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    // ── Accumulated state ──

    pub fn reply(&self) -> &Reply { &self.reply }
    pub fn attributes(&self) -> &Attributes { &self.attributes }
    pub fn status(&self) -> Option<ReplyStatus> { self.attributes.status }
    pub fn action(&self) -> Option<&str> { self.attributes.action.as_deref() }
    pub fn request_body(&self) -> Option<&Value> { self.request_body.as_ref() }
    pub fn view(&self) -> &Value { &self.view }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }

    pub fn controller(&self) -> Option<&Controller> {
        self.routed.as_ref().map(|r| &r.controller)
    }

    pub fn params(&self) -> Option<&RouteParams> {
        self.routed.as_ref().map(|r| &r.params)
    }

    /// Whether the matched route supplied an `id`.
    pub fn has_identity(&self) -> bool {
        self.params().is_some_and(RouteParams::has_identity)
    }

    pub fn into_reply(self) -> Reply { self.reply }

    // ── Constructors ──

    pub fn with_reply(mut self, f: impl FnOnce(&mut Reply)) -> Self {
        f(&mut self.reply);
        self
    }

    pub fn with_status(mut self, status: ReplyStatus) -> Self {
        self.attributes.status = Some(status);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = self.attributes.merge(attributes);
        self
    }

    /// Records the resolved action and selects it on the routed controller.
    pub fn with_selected_action(mut self, action: &str) -> Self {
        self.attributes.action = Some(action.to_owned());
        if let Some(routed) = self.routed.as_mut() {
            routed.controller = routed.controller.select(action);
        }
        self
    }

    /// Merges a route match into the context. Route attributes overlay the
    /// request's.
    pub fn with_route(mut self, matched: RouteMatch) -> Self {
        let RouteMatch { controller, attributes, params } = matched;
        self.attributes = self.attributes.merge(attributes);
        self.routed = Some(Routed { controller, params });
        self
    }

    pub fn with_request_body(mut self, value: Value) -> Self {
        self.request_body = Some(value);
        self
    }

    pub fn with_view(mut self, view: Value) -> Self {
        self.view = view;
        self
    }

    /// Marks this context as failed. Once set, an error is replaced only by
    /// a newer one, never cleared.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers.get(X_FORWARDED_FOR)?
        .to_str().ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use http_body_util::Empty;
    use bytes::Bytes;

    use super::*;

    fn request(headers: &[(&str, &str)]) -> http::Request<Empty<Bytes>> {
        let mut builder = http::Request::builder().uri("/users/7?x=1");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Empty::new()).unwrap()
    }

    #[test]
    fn remote_prefers_forwarded_for() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let ctx = Context::incoming(
            request(&[("x-forwarded-for", "203.0.113.5, 10.0.0.1")]),
            Some(peer),
            Duration::from_secs(1),
        );
        assert_eq!(ctx.remote(), "203.0.113.5".parse::<IpAddr>().unwrap());

        let ctx = Context::incoming(request(&[]), Some(peer), Duration::from_secs(1));
        assert_eq!(ctx.remote(), peer.ip());

        let ctx = Context::from_request(request(&[("x-forwarded-for", "garbage")]));
        assert_eq!(ctx.remote(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn with_constructors_leave_the_original_alone() {
        let base = Context::from_request(request(&[]));
        let failed = base.clone().with_status(ReplyStatus::Timeout).with_error("late");

        assert_eq!(base.status(), None);
        assert_eq!(base.error(), None);
        assert_eq!(failed.status(), Some(ReplyStatus::Timeout));
        assert_eq!(failed.error(), Some("late"));
        assert_eq!(failed.path(), "/users/7");
        assert_eq!(base.view(), &Value::Object(Map::new()));
    }

    #[test]
    fn attributes_merge_over() {
        let mut extra = BTreeMap::new();
        extra.insert("tenant".to_owned(), "a".to_owned());
        let request = Attributes { action: Some("list".into()), extra, ..Default::default() };

        let mut extra = BTreeMap::new();
        extra.insert("zone".to_owned(), "eu".to_owned());
        let route = Attributes { endpoint: Some("/users/:id".into()), extra, ..Default::default() };

        let merged = request.merge(route);
        assert_eq!(merged.action.as_deref(), Some("list"));
        assert_eq!(merged.endpoint.as_deref(), Some("/users/:id"));
        assert_eq!(merged.extra.len(), 2);
    }
}
