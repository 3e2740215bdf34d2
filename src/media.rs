//! Media types (`top/sub; key=value`).
//!
//! A [`MediaType`] is always canonical: top and sub types are lowercase,
//! unknown or missing top types collapse to `application/octet-stream`,
//! `text/*` carries a `charset` (default `us-ascii`) and `multipart/*` a
//! `boundary` (default empty). Its [`Display`](fmt::Display) output is a
//! valid `Content-Type` value that parses back to an equal value.

use std::collections::BTreeMap;
use std::fmt;

use crate::header;

pub const WILDCARD: &str = "*";

const TOP_TYPES: [&str; 10] = [
    WILDCARD,
    "application",
    "audio",
    "font",
    "image",
    "message",
    "model",
    "multipart",
    "text",
    "video",
];

/// Parameter map of a media type. Order is irrelevant; kept sorted so
/// encoding is deterministic.
pub type Params = BTreeMap<String, String>;

/// A parsed media type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaType {
    mime: String,
    top: String,
    sub: String,
    params: Params,
}

impl MediaType {
    /// Builds `top/sub` with the same canonicalisation as [`parse`](Self::parse).
    pub fn new(top: &str, sub: &str) -> Self {
        Self::parse(&format!("{top}/{sub}"))
    }

    /// Leniently parses a bare `top/sub` token.
    ///
    /// - a missing sub type defaults to `*` for `*` and `plain` for `text`
    /// - `*` as top type forces the sub type to `*`
    /// - anything else unrecognisable becomes `application/octet-stream`
    pub fn parse(token: &str) -> Self {
        Self::parse_with(token, Params::new())
    }

    pub fn parse_with(token: &str, params: Params) -> Self {
        let token = token.trim().to_ascii_lowercase();
        let (top, sub) = match token.split_once('/') {
            Some((top, sub)) => (top, sub),
            None => (token.as_str(), ""),
        };

        if !TOP_TYPES.contains(&top) {
            return Self::build("application".into(), "octet-stream".into(), params);
        }

        let sub = match (top, sub) {
            (WILDCARD, _) => WILDCARD,
            ("text", "") => "plain",
            (_, "") => return Self::build("application".into(), "octet-stream".into(), params),
            (_, sub) => sub,
        };

        Self::build(top.to_owned(), sub.to_owned(), params)
    }

    /// `application/json; charset=utf-8`
    pub fn json() -> Self {
        Self::new("application", "json").with_param("charset", "utf-8")
    }

    /// `text/plain; charset=utf-8`
    pub fn text() -> Self {
        Self::new("text", "plain").with_param("charset", "utf-8")
    }

    /// `text/html; charset=utf-8`
    pub fn html() -> Self {
        Self::new("text", "html").with_param("charset", "utf-8")
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    fn build(top: String, sub: String, mut params: Params) -> Self {
        match top.as_str() {
            "text" => { params.entry("charset".into()).or_insert_with(|| "us-ascii".into()); }
            "multipart" => { params.entry("boundary".into()).or_default(); }
            _ => {}
        }
        Self { mime: format!("{top}/{sub}"), top, sub, params }
    }

    /// The canonical `top/sub` string.
    pub fn mime(&self) -> &str { &self.mime }
    pub fn top(&self) -> &str { &self.top }
    pub fn sub(&self) -> &str { &self.sub }
    pub fn params(&self) -> &Params { &self.params }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// 2 for `top/sub`, 1 for `top/*`, 0 for `*/*`.
    pub fn specificity(&self) -> u8 {
        if self.top == WILDCARD {
            0
        } else if self.sub == WILDCARD {
            1
        } else {
            2
        }
    }

    /// Whether `self` and `other` describe compatible types. A wildcard on
    /// either side matches anything.
    pub fn matches(&self, other: &MediaType) -> bool {
        let part = |a: &str, b: &str| a == WILDCARD || b == WILDCARD || a == b;
        part(&self.top, &other.top) && part(&self.sub, &other.sub)
    }
}

/// Encodes as a `Content-Type` value: `top/sub; key=value; ...`.
impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime)?;
        for (key, value) in &self.params {
            write!(f, "; {key}={}", header::quote(value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn parses_known_top_types() {
        let image = MediaType::parse("image/svg+xml");
        assert_eq!(image.mime(), "image/svg+xml");
        assert_eq!(image.top(), "image");
        assert_eq!(image.sub(), "svg+xml");
        assert!(image.params().is_empty());

        assert_eq!(MediaType::parse("video/H264").mime(), "video/h264");
    }

    #[test]
    fn text_and_multipart_carry_default_params() {
        assert_eq!(MediaType::parse("text/plain").param("charset"), Some("us-ascii"));
        assert_eq!(
            MediaType::parse_with("text/plain", params(&[("charset", "utf-8")])).param("charset"),
            Some("utf-8"),
        );
        let form = MediaType::parse_with("multipart/form-data", params(&[("foo", "bar")]));
        assert_eq!(form.params(), &params(&[("boundary", ""), ("foo", "bar")]));
    }

    #[test]
    fn malformed_tokens_fall_back() {
        assert_eq!(MediaType::parse("video").mime(), "application/octet-stream");
        assert_eq!(MediaType::parse("video/").mime(), "application/octet-stream");
        assert_eq!(MediaType::parse("nonsense/thing").mime(), "application/octet-stream");
        assert_eq!(MediaType::parse("text").mime(), "text/plain");
        assert_eq!(MediaType::parse("*").mime(), "*/*");
        assert_eq!(MediaType::parse("*/json").mime(), "*/*");
    }

    #[test]
    fn new_canonicalises_like_parse() {
        let vendor = MediaType::new("vnd", "x");
        assert_eq!(vendor.mime(), "application/octet-stream");
        assert_eq!(MediaType::parse(&vendor.to_string()), vendor);

        assert_eq!(MediaType::new("*", "json").mime(), "*/*");
        assert_eq!(MediaType::new("Text", "HTML").param("charset"), Some("us-ascii"));
    }

    #[test]
    fn specificity_orders_wildcards_last() {
        assert_eq!(MediaType::parse("model/bar").specificity(), 2);
        assert_eq!(MediaType::parse("model/*").specificity(), 1);
        assert_eq!(MediaType::parse("*/*").specificity(), 0);
    }

    #[test]
    fn wildcards_match_either_side() {
        let json = MediaType::json();
        assert!(MediaType::parse("*/*").matches(&json));
        assert!(MediaType::parse("application/*").matches(&json));
        assert!(json.matches(&MediaType::parse("application/*")));
        assert!(!MediaType::parse("text/*").matches(&json));
        assert!(!MediaType::parse("application/xml").matches(&json));
    }

    #[test]
    fn displays_as_content_type() {
        assert_eq!(MediaType::json().to_string(), "application/json; charset=utf-8");
        assert_eq!(
            MediaType::new("multipart", "form-data").to_string(),
            r#"multipart/form-data; boundary="""#,
        );
    }
}
