//! Cross-origin allow-listing.
//!
//! Origins are matched exactly against a static allow-list. A request from
//! an origin that is not listed is still served; it just gets no CORS
//! headers.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    ORIGIN, VARY,
};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Deserializer};

use crate::context::Context;
use crate::header::{decode_header_list, encode_list};
use crate::reply::Reply;

/// Headers a browser may always send; never listed explicitly.
const SAFE_HEADERS: [&str; 3] = ["Accept", "Accept-Language", "Content-Language"];

const PREFLIGHT_VARY: &str = "Origin, Access-Control-Request-Method, Access-Control-Request-Headers";

/// One allow-listed origin.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsOrigin {
    pub origin: String,
    #[serde(deserialize_with = "methods")]
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub max_age: Option<u64>,
}

impl CorsOrigin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into(), ..Self::default() }
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    pub fn headers<S: Into<String>>(mut self, headers: impl IntoIterator<Item = S>) -> Self {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

fn methods<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Method>, D::Error> {
    Vec::<String>::deserialize(deserializer)?
        .into_iter()
        .map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(serde::de::Error::custom))
        .collect()
}

fn listed<'a>(origins: &'a [CorsOrigin], origin: Option<&str>) -> Option<&'a CorsOrigin> {
    let origin = origin?;
    origins.iter().find(|listed| listed.origin == origin)
}

fn set(reply: &mut Reply, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        reply.set_header(name, value);
    }
}

/// Echoes `Access-Control-Allow-Origin` when the request origin is listed.
pub fn encode_cors_origin(origins: &[CorsOrigin], context: Context) -> Context {
    let Some(listed) = listed(origins, context.header(ORIGIN)) else { return context };
    let origin = listed.origin.clone();
    context.with_reply(|reply| set(reply, ACCESS_CONTROL_ALLOW_ORIGIN, &origin))
}

/// Answers a preflight. The reply is always `204` with an empty body; CORS
/// headers are added only for a listed origin.
pub fn encode_cors_preflight(origins: &[CorsOrigin], context: Context) -> Context {
    let listed = listed(origins, context.header(ORIGIN)).cloned();
    let requested_method = context.header(ACCESS_CONTROL_REQUEST_METHOD).map(str::trim).map(str::to_owned);
    let requested_headers = context.header(ACCESS_CONTROL_REQUEST_HEADERS)
        .map(decode_header_list)
        .unwrap_or_default();

    context.with_reply(|reply| {
        if let Some(listed) = listed {
            let methods: Vec<&str> = listed.allowed_methods.iter()
                .map(Method::as_str)
                .filter(|m| requested_method.as_deref() == Some(*m))
                .collect();
            let headers: Vec<&str> = requested_headers.iter()
                .map(String::as_str)
                .filter(|h| !SAFE_HEADERS.iter().any(|safe| safe.eq_ignore_ascii_case(h)))
                .filter(|h| listed.allowed_headers.iter().any(|a| a.eq_ignore_ascii_case(h)))
                .collect();

            set(reply, ACCESS_CONTROL_ALLOW_ORIGIN, &listed.origin);
            set(reply, ACCESS_CONTROL_ALLOW_METHODS, &encode_list(&methods));
            set(reply, ACCESS_CONTROL_ALLOW_HEADERS, &encode_list(&headers));
            set(reply, ACCESS_CONTROL_MAX_AGE, &listed.max_age.unwrap_or(0).to_string());
            set(reply, VARY, PREFLIGHT_VARY);
        }
        reply.send_empty(StatusCode::NO_CONTENT);
    })
}
