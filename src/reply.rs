//! The outgoing reply and the encoders that fill it.
//!
//! A [`Reply`] travels inside the context like every other field, so a step
//! writes to it by producing a new context. Whatever encoder fills it,
//! `Content-Length` is always the byte length of the body actually stored,
//! and headers are set before the body.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use serde_json::{Value, json};

use crate::context::Context;
use crate::flow::{Fault, StepResult, Transition};
use crate::media::MediaType;
use crate::status::{code_of_status, message_of_code};

// ── Reply ─────────────────────────────────────────────────────────────────────

/// The response under construction.
#[derive(Clone, Debug)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    ended: bool,
}

impl Reply {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            ended: false,
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn is_ended(&self) -> bool { self.ended }

    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_status(&mut self, code: StatusCode) {
        self.status = code;
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Writes status, content headers and body in one go. A reply that was
    /// already ended is left untouched.
    pub fn send(&mut self, code: StatusCode, content_type: &MediaType, body: impl Into<Bytes>) {
        if self.ended {
            return;
        }
        let body = body.into();
        self.status = code;
        if let Ok(value) = HeaderValue::try_from(content_type.to_string()) {
            self.headers.insert(CONTENT_TYPE, value);
        }
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
    }

    /// Status-only reply with an empty body.
    pub fn send_empty(&mut self, code: StatusCode) {
        if self.ended {
            return;
        }
        self.status = code;
        self.headers.remove(CONTENT_TYPE);
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(0));
        self.body = Bytes::new();
    }

    /// Terminates the output; later writes are ignored.
    pub fn end(&mut self) {
        self.ended = true;
    }

    /// Converts into the wire response. `Content-Length` is recomputed from
    /// the stored body no matter what was set before.
    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut headers = self.headers;
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));

        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

impl Default for Reply {
    fn default() -> Self { Self::new() }
}

// ── Encoders ──────────────────────────────────────────────────────────────────

/// `<code> - <message>` as `text/plain; charset=utf-8`.
pub fn send_text_reply(reply: &mut Reply, code: StatusCode) {
    let body = format!("{} - {}", code.as_u16(), message_of_code(code));
    reply.send(code, &MediaType::text(), body);
}

/// `{"status":"<message>"}` as JSON.
pub fn send_json_reply(reply: &mut Reply, code: StatusCode) {
    let body = json!({ "status": message_of_code(code) }).to_string();
    reply.send(code, &MediaType::json(), body);
}

/// A minimal HTML document naming the status.
pub fn send_html_reply(reply: &mut Reply, code: StatusCode) {
    let message = message_of_code(code);
    let body = format!(
        r#"<!DOCTYPE html><html lang="en"><head><title>{message}</title></head><body><pre>{message}</pre></body></html>"#
    );
    reply.send(code, &MediaType::html(), body);
}

pub fn encode_json(view: &Value) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(view).map(Bytes::from)
}

// ── Steps ─────────────────────────────────────────────────────────────────────

/// Step: serialises the view as the JSON body, keeping the status already
/// chosen. `204` and `304` replies carry no body. An encoder failure faults
/// the traversal here.
pub async fn encode_json_reply(context: Context) -> StepResult<Context> {
    let code = context.reply().status();
    if code == StatusCode::NO_CONTENT || code == StatusCode::NOT_MODIFIED {
        return Ok(Transition::default(context.with_reply(|reply| reply.send_empty(code))));
    }

    let body = match encode_json(context.view()) {
        Ok(body) => body,
        Err(err) => return Err(Fault::new(context, err)),
    };
    Ok(Transition::default(context.with_reply(|reply| reply.send(code, &MediaType::json(), body))))
}

/// Step: sets the reply code from the recorded status and replaces the view
/// with `{"status": "<message>"}`.
pub async fn error_reply(context: Context) -> StepResult<Context> {
    let code = code_of_status(context.status());
    let view = json!({ "status": message_of_code(code) });

    Ok(Transition::default(
        context.with_reply(|reply| reply.set_status(code)).with_view(view),
    ))
}
