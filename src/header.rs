//! Header value codecs: list headers, `Content-Type`, and the
//! quality-weighted `Accept` / `Accept-Charset` families.

use std::borrow::Cow;

use thiserror::Error;

use crate::media::{MediaType, Params, WILDCARD};

/// A header value that could not be decoded.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("malformed header value `{0}`")]
pub struct MalformedHeader(pub String);

/// One entry of a quality-weighted header list.
#[derive(Clone, Debug, PartialEq)]
pub struct Preference<T> {
    /// The raw entry as it appeared in the header.
    pub token: String,
    pub data: T,
    /// Quality, clamped to `[0, 1]`.
    pub q: f32,
}

// ── Lists ─────────────────────────────────────────────────────────────────────

/// Canonical HTTP capitalisation: `content-type` → `Content-Type`.
pub fn capitalize_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let c = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
            upper = c == '-';
            c
        })
        .collect()
}

/// Decodes a list of header names (e.g. `Access-Control-Request-Headers`)
/// into their canonical capitalisation. Empty entries are skipped.
pub fn decode_header_list(value: &str) -> Vec<String> {
    value.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(capitalize_header_name)
        .collect()
}

pub fn encode_list<S: AsRef<str>>(items: &[S]) -> String {
    items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}

// ── Content-Type ──────────────────────────────────────────────────────────────

/// Strictly decodes a `Content-Type` value.
///
/// The type and parameter keys are lowercased; for duplicate keys the first
/// occurrence wins. A missing `/`, an invalid token or a parameter without
/// `=` makes the whole value malformed.
pub fn decode_content_type(value: &str) -> Result<MediaType, MalformedHeader> {
    let malformed = || MalformedHeader(value.to_owned());
    let mut parts = split_unquoted(value, ';').into_iter();
    let token = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

    if media_token(&token).is_none() {
        return Err(malformed());
    }

    let mut params = Params::new();
    for part in parts.map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=').ok_or_else(malformed)?;
        let key = key.trim().to_ascii_lowercase();
        if !is_token(&key) {
            return Err(malformed());
        }
        params.entry(key).or_insert_with(|| unquote(value.trim()));
    }

    Ok(MediaType::parse_with(&token, params))
}

// ── Preferences ───────────────────────────────────────────────────────────────

/// Decodes an `Accept` header.
///
/// Sorted by descending quality, then specificity (`top/sub` before `top/*`
/// before `*/*`), then by number of explicit parameters. Entries with an
/// unusable quality or media type are dropped; the rest are kept.
pub fn decode_accept(value: &str) -> Vec<Preference<MediaType>> {
    decode_preferences(value, |token, params| {
        media_token(&token.to_ascii_lowercase())?;
        let explicit = params.len();
        let media = MediaType::parse_with(token, params);
        let rank = (media.specificity(), explicit);
        Some((media, rank))
    })
}

/// Decodes an `Accept-Charset` header. The `*` wildcard sorts after named
/// charsets of equal quality.
pub fn decode_accept_charset(value: &str) -> Vec<Preference<String>> {
    decode_preferences(value, |token, _| {
        if token != WILDCARD && !is_token(token) {
            return None;
        }
        let rank = (u8::from(token != WILDCARD), 0);
        Some((token.to_ascii_lowercase(), rank))
    })
}

fn decode_preferences<T>(
    value: &str,
    decode: impl Fn(&str, Params) -> Option<(T, (u8, usize))>,
) -> Vec<Preference<T>> {
    let mut ranked: Vec<_> = split_unquoted(value, ',')
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let mut parts = split_unquoted(entry, ';').into_iter();
            let token = parts.next().unwrap_or_default().trim();
            let mut q = None;
            let mut params = Params::new();

            for part in parts.map(str::trim).filter(|p| !p.is_empty()) {
                let (key, value) = part.split_once('=').unwrap_or((part, ""));
                let key = key.trim().to_ascii_lowercase();

                // Only the first q marks quality; later ones are parameters.
                if key == "q" && q.is_none() {
                    q = Some(parse_quality(value.trim())?);
                } else {
                    params.entry(key).or_insert_with(|| unquote(value.trim()));
                }
            }

            if token.is_empty() {
                return None;
            }
            let (data, rank) = decode(token, params)?;
            let preference = Preference { token: entry.to_owned(), data, q: q.unwrap_or(1.0) };
            Some((preference, rank))
        })
        .collect();

    ranked.sort_by(|(a, ra), (b, rb)| b.q.total_cmp(&a.q).then_with(|| rb.cmp(ra)));
    ranked.into_iter().map(|(preference, _)| preference).collect()
}

fn parse_quality(value: &str) -> Option<f32> {
    let q: f32 = value.parse().ok()?;
    if q.is_nan() || q < 0.0 {
        return None;
    }
    Some(q.min(1.0))
}

// ── Tokens ────────────────────────────────────────────────────────────────────

/// Splits `top/sub` where both halves are non-empty tokens.
fn media_token(token: &str) -> Option<(&str, &str)> {
    let (top, sub) = token.split_once('/')?;
    (is_token(top) && is_token(sub)).then_some((top, sub))
}

/// RFC 9110 `token`.
fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Quotes `value` unless it is a plain token.
pub(crate) fn quote(value: &str) -> Cow<'_, str> {
    if is_token(value) {
        return Cow::Borrowed(value);
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_owned();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Splits on `sep` outside of quoted strings.
fn split_unquoted(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c == sep && !quoted => {
                parts.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}
