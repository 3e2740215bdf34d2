//! Content negotiation steps.
//!
//! Each step compares one request header with the candidates the server
//! declares, in the server's order, and leaves on the edge labelled with the
//! first candidate the client accepts:
//!
//! | header | absent | accepted | not accepted | malformed |
//! |---|---|---|---|---|
//! | `Content-Type` | default | candidate | `mismatch` | failure |
//! | `Accept` | default | candidate | failure | failure |
//! | `Accept-Charset` | default | candidate | failure | failure |
//!
//! A header that is present but not visible ASCII counts as malformed, never
//! as absent. Preferences are walked best first, `q=0` entries included, and
//! the first one matching any candidate wins.

use std::sync::Arc;

use http::header::{ACCEPT, ACCEPT_CHARSET, CONTENT_TYPE};
use http::{HeaderName, HeaderValue};
use tracing::debug;

use crate::context::Context;
use crate::flow::{BoxFuture, StepResult, Transition};
use crate::header::{decode_accept, decode_accept_charset, decode_content_type};
use crate::media::{MediaType, WILDCARD};

/// Edge taken when a well-formed `Content-Type` is not supported.
pub const MISMATCH: &str = "mismatch";

/// Server-side media type candidates, each with the edge it selects.
#[derive(Clone, Debug)]
pub struct MediaMap(Arc<[(MediaType, &'static str)]>);

impl MediaMap {
    pub fn new(candidates: impl IntoIterator<Item = (MediaType, &'static str)>) -> Self {
        Self(candidates.into_iter().collect())
    }
}

/// Server-side charset candidates, each with the edge it selects.
#[derive(Clone, Debug)]
pub struct CharsetMap(Arc<[(&'static str, &'static str)]>);

impl CharsetMap {
    pub fn new(candidates: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
        Self(candidates.into_iter().collect())
    }
}

/// Outcome of comparing one header with a candidate list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Negotiation {
    Absent,
    Malformed,
    Matched(&'static str),
    Unmatched,
}

// ── Matching ──────────────────────────────────────────────────────────────────

pub fn negotiate_content_type(map: &MediaMap, header: Option<&str>) -> Negotiation {
    let Some(header) = header else { return Negotiation::Absent };
    let Ok(media) = decode_content_type(header) else { return Negotiation::Malformed };

    map.0.iter()
        .find(|(candidate, _)| candidate.matches(&media))
        .map_or(Negotiation::Unmatched, |&(_, label)| Negotiation::Matched(label))
}

pub fn negotiate_accept(map: &MediaMap, header: Option<&str>) -> Negotiation {
    let Some(header) = header else { return Negotiation::Absent };

    decode_accept(header).iter()
        .find_map(|pref| {
            map.0.iter()
                .find(|(candidate, _)| pref.data.matches(candidate))
                .map(|&(_, label)| Negotiation::Matched(label))
        })
        .unwrap_or(Negotiation::Unmatched)
}

pub fn negotiate_charset(map: &CharsetMap, header: Option<&str>) -> Negotiation {
    let Some(header) = header else { return Negotiation::Absent };

    decode_accept_charset(header).iter()
        .find_map(|pref| {
            map.0.iter()
                .find(|(charset, _)| pref.data == WILDCARD || pref.data.eq_ignore_ascii_case(charset))
                .map(|&(_, label)| Negotiation::Matched(label))
        })
        .unwrap_or(Negotiation::Unmatched)
}

// ── Steps ─────────────────────────────────────────────────────────────────────

type StepFuture = BoxFuture<'static, StepResult<Context>>;

/// Step over the request `Content-Type`.
pub fn filter_content_type(map: MediaMap) -> impl Fn(Context) -> StepFuture + Send + Sync + 'static {
    step(move |context| {
        let outcome = negotiate_header(&context, CONTENT_TYPE, |h| negotiate_content_type(&map, h));
        match outcome {
            Negotiation::Absent => Transition::default(context),
            Negotiation::Matched(label) => Transition::named(label, context),
            Negotiation::Unmatched => Transition::named(MISMATCH, context),
            Negotiation::Malformed => {
                debug!(value = ?context.headers().get(CONTENT_TYPE), "malformed content-type");
                Transition::failure(context)
            }
        }
    })
}

/// Step over the request `Accept`.
pub fn filter_accept(map: MediaMap) -> impl Fn(Context) -> StepFuture + Send + Sync + 'static {
    step(move |context| {
        let outcome = negotiate_header(&context, ACCEPT, |h| negotiate_accept(&map, h));
        preference_edge(outcome, context)
    })
}

/// Step over the request `Accept-Charset`.
pub fn filter_accept_charset(map: CharsetMap) -> impl Fn(Context) -> StepFuture + Send + Sync + 'static {
    step(move |context| {
        let outcome = negotiate_header(&context, ACCEPT_CHARSET, |h| negotiate_charset(&map, h));
        preference_edge(outcome, context)
    })
}

/// Reads `name` raw so a value that is not visible ASCII is malformed
/// rather than missing.
fn negotiate_header<F>(context: &Context, name: HeaderName, negotiate: F) -> Negotiation
where
    F: FnOnce(Option<&str>) -> Negotiation,
{
    match context.headers().get(name).map(HeaderValue::to_str) {
        None => negotiate(None),
        Some(Ok(value)) => negotiate(Some(value)),
        Some(Err(_)) => Negotiation::Malformed,
    }
}

fn preference_edge(outcome: Negotiation, context: Context) -> Transition<Context> {
    match outcome {
        Negotiation::Absent => Transition::default(context),
        Negotiation::Matched(label) => Transition::named(label, context),
        Negotiation::Unmatched | Negotiation::Malformed => Transition::failure(context),
    }
}

/// Lifts a synchronous decision into an async step.
fn step<F>(decide: F) -> impl Fn(Context) -> StepFuture + Send + Sync + 'static
where
    F: Fn(Context) -> Transition<Context> + Send + Sync + 'static,
{
    move |context: Context| -> StepFuture {
        let transition = decide(context);
        Box::pin(async move { Ok(transition) })
    }
}
