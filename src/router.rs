//! Path-template router.
//!
//! Routes are tried in the order they were registered and the first match
//! wins, so specific templates go before catch-alls. Each template compiles
//! to one or more radix trees ([`matchit`]) once at startup; lookups never
//! allocate a tree or lock anything.
//!
//! Template syntax:
//!
//! | segment | matches |
//! |---|---|
//! | `users` | the literal segment |
//! | `:id` | one segment, captured as `id` |
//! | `:path*` | the rest of the path, slashes included; may be empty, leaving it [`ParamValue::Absent`] |
//! | `:id?` | an optional trailing segment; unset means [`ParamValue::Absent`] |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::{Method, Uri};
use matchit::Router as MatchitRouter;
use thiserror::Error;
use tracing::debug;

use crate::context::Attributes;
use crate::controller::Controller;

/// Parameter carrying the resource identity for REST routes.
pub const IDENTITY: &str = "id";

// ── Params ────────────────────────────────────────────────────────────────────

/// One extracted parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParamValue {
    One(String),
    /// A query key given more than once.
    Many(Vec<String>),
    /// An optional or catch-all segment that was not supplied.
    Absent,
}

impl ParamValue {
    /// The single value, or the first of several.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::One(v) => Some(v),
            Self::Many(vs) => vs.first().map(String::as_str),
            Self::Absent => None,
        }
    }
}

/// Path and query parameters of a matched route.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteParams(BTreeMap<String, ParamValue>);

impl RouteParams {
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Shorthand for `get(key)?.as_str()`.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// `true` when an `id` is present and not absent.
    pub fn has_identity(&self) -> bool {
        self.str(IDENTITY).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.0.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn push_query(&mut self, key: String, value: String) {
        use std::collections::btree_map::Entry;

        match self.0.entry(key) {
            Entry::Vacant(slot) => { slot.insert(ParamValue::One(value)); }
            Entry::Occupied(mut slot) => {
                let merged = match std::mem::replace(slot.get_mut(), ParamValue::Absent) {
                    ParamValue::One(first) => ParamValue::Many(vec![first, value]),
                    ParamValue::Many(mut all) => { all.push(value); ParamValue::Many(all) }
                    ParamValue::Absent => ParamValue::One(value),
                };
                *slot.get_mut() = merged;
            }
        }
    }
}

// ── Match ─────────────────────────────────────────────────────────────────────

/// What a route callback receives.
#[derive(Debug)]
pub struct RouteData<'a> {
    pub path: &'a str,
    pub template: &'a str,
    pub params: RouteParams,
}

/// The outcome of path resolution.
#[derive(Clone, Debug)]
pub struct RouteMatch {
    pub controller: Controller,
    pub attributes: Attributes,
    pub params: RouteParams,
}

impl RouteMatch {
    pub fn new(controller: Controller, params: RouteParams) -> Self {
        Self { controller, attributes: Attributes::default(), params }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = self.attributes.merge(attributes);
        self
    }
}

/// No template matched.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("no route {method} {path}")]
pub struct NoRoute {
    pub method: Method,
    pub path: String,
}

// ── Router ────────────────────────────────────────────────────────────────────

type Resolve = Arc<dyn Fn(RouteData<'_>) -> RouteMatch + Send + Sync + 'static>;

struct Route {
    template: String,
    trees: Vec<MatchitRouter<()>>,
    /// Parameter left [`ParamValue::Absent`] when its segment is missing.
    unset: Option<String>,
    resolve: Resolve,
}

/// An ordered list of path templates. Build it once at startup.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers `template` with a callback building the route match.
    /// Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if the template is invalid.
    pub fn route<F>(mut self, template: &str, resolve: F) -> Self
    where
        F: Fn(RouteData<'_>) -> RouteMatch + Send + Sync + 'static,
    {
        let (patterns, unset) = compile(template);
        let trees = patterns.iter()
            .map(|pattern| {
                let mut tree = MatchitRouter::new();
                tree.insert(pattern.as_str(), ())
                    .unwrap_or_else(|e| panic!("invalid route `{template}`: {e}"));
                tree
            })
            .collect();

        self.routes.push(Route {
            template: template.to_owned(),
            trees,
            unset,
            resolve: Arc::new(resolve),
        });
        self
    }

    /// Registers a REST controller. The template is published as the
    /// `endpoint` attribute.
    pub fn rest(self, template: &str, controller: Controller) -> Self {
        self.route(template, move |data| {
            let endpoint = Attributes {
                endpoint: Some(data.template.to_owned()),
                ..Attributes::default()
            };
            RouteMatch::new(controller.clone(), data.params).with_attributes(endpoint)
        })
    }

    /// Resolves `uri` against the routes in registration order.
    pub fn resolve(&self, method: &Method, uri: &Uri) -> Result<RouteMatch, NoRoute> {
        let path = uri.path();

        for route in &self.routes {
            let Some(matched) = route.trees.iter().find_map(|tree| tree.at(path).ok()) else { continue };

            let mut params = query_params(uri.query());
            if let Some(name) = &route.unset {
                params.insert(name.clone(), ParamValue::Absent);
            }
            for (key, value) in matched.params.iter() {
                params.insert(key, ParamValue::One(value.to_owned()));
            }

            debug!(template = %route.template, %path, "route matched");
            return Ok((route.resolve)(RouteData { path, template: &route.template, params }));
        }

        Err(NoRoute { method: method.clone(), path: path.to_owned() })
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.iter().map(|r| &r.template)).finish()
    }
}

fn query_params(query: Option<&str>) -> RouteParams {
    let mut params = RouteParams::default();
    let Some(query) = query else { return params };

    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().for_each(|(k, v)| params.push_query(k, v)),
        Err(err) => debug!(%err, "query string ignored"),
    }
    params
}

/// Translates a template into `matchit` patterns, one tree each. An optional
/// trailing segment adds the pattern without it; a catch-all adds its prefix
/// with and without the trailing slash. Also returns the parameter those
/// extra patterns leave unset.
fn compile(template: &str) -> (Vec<String>, Option<String>) {
    let Some(rest) = template.strip_prefix('/') else {
        panic!("invalid route `{template}`: must start with '/'");
    };

    let segments: Vec<&str> = rest.split('/').collect();
    let last = segments.len() - 1;
    let mut parts = Vec::with_capacity(segments.len());
    let mut unset = None;
    let mut catch_all = false;

    for (i, segment) in segments.iter().enumerate() {
        let Some(name) = segment.strip_prefix(':') else {
            parts.push(segment.replace('{', "{{").replace('}', "}}"));
            continue;
        };

        let (name, part) = if let Some(name) = name.strip_suffix('*') {
            if i != last {
                panic!("invalid route `{template}`: catch-all `{name}` must be last");
            }
            unset = Some(name.to_owned());
            catch_all = true;
            (name, format!("{{*{name}}}"))
        } else if let Some(name) = name.strip_suffix('?') {
            if i != last {
                panic!("invalid route `{template}`: optional segment `{name}` must be last");
            }
            unset = Some(name.to_owned());
            (name, format!("{{{name}}}"))
        } else {
            (name, format!("{{{name}}}"))
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            panic!("invalid route `{template}`: bad parameter name `{name}`");
        }
        parts.push(part);
    }

    let full = format!("/{}", parts.join("/"));
    if unset.is_none() {
        return (vec![full], None);
    }
    let short = format!("/{}", parts[..last].join("/"));
    let mut patterns = vec![full, short.clone()];
    if catch_all && short != "/" {
        patterns.push(format!("{short}/"));
    }
    (patterns, unset)
}
