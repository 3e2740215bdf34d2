//! The closed set of protocol-layer reply outcomes.
//!
//! Pipelines never hand raw HTTP codes around for failures. A step that ends
//! a request early records a [`ReplyStatus`] on the context and the error
//! reply node turns it into a code and a body:
//!
//! | status | code |
//! |---|---|
//! | `ok` | 200 |
//! | `request_malformed`, `request_unsupported`, `mime_unsupported` | 400 |
//! | `auth_malformed`, `auth_failed` | 401 |
//! | `endpoint_unavailable`, `resource_missing` | 404 |
//! | `action_unavailable` | 405 |
//! | `resource_mismatch` | 406 |
//! | `timeout` | 408 |
//! | `error` | 500 |
//! | `service_unavailable` | 503 |

use std::fmt;
use std::str::FromStr;

use http::StatusCode;

/// A protocol-layer outcome. Each maps to exactly one HTTP status code.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReplyStatus {
    Ok,
    RequestMalformed,
    RequestUnsupported,
    MimeUnsupported,
    ActionUnavailable,
    AuthMalformed,
    AuthFailed,
    ResourceMissing,
    ResourceMismatch,
    ServiceUnavailable,
    Timeout,
    Error,
    EndpointUnavailable,
}

impl ReplyStatus {
    pub const ALL: [ReplyStatus; 13] = [
        Self::Ok,
        Self::RequestMalformed,
        Self::RequestUnsupported,
        Self::MimeUnsupported,
        Self::ActionUnavailable,
        Self::AuthMalformed,
        Self::AuthFailed,
        Self::ResourceMissing,
        Self::ResourceMismatch,
        Self::ServiceUnavailable,
        Self::Timeout,
        Self::Error,
        Self::EndpointUnavailable,
    ];

    pub fn code(self) -> StatusCode {
        match self {
            Self::Ok                  => StatusCode::OK,
            Self::RequestMalformed    => StatusCode::BAD_REQUEST,
            Self::RequestUnsupported  => StatusCode::BAD_REQUEST,
            Self::MimeUnsupported     => StatusCode::BAD_REQUEST,
            Self::ActionUnavailable   => StatusCode::METHOD_NOT_ALLOWED,
            Self::AuthMalformed       => StatusCode::UNAUTHORIZED,
            Self::AuthFailed          => StatusCode::UNAUTHORIZED,
            Self::ResourceMissing     => StatusCode::NOT_FOUND,
            Self::ResourceMismatch    => StatusCode::NOT_ACCEPTABLE,
            Self::ServiceUnavailable  => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout             => StatusCode::REQUEST_TIMEOUT,
            Self::Error               => StatusCode::INTERNAL_SERVER_ERROR,
            Self::EndpointUnavailable => StatusCode::NOT_FOUND,
        }
    }

    /// The snake-case token, e.g. `"resource_missing"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok                  => "ok",
            Self::RequestMalformed    => "request_malformed",
            Self::RequestUnsupported  => "request_unsupported",
            Self::MimeUnsupported     => "mime_unsupported",
            Self::ActionUnavailable   => "action_unavailable",
            Self::AuthMalformed       => "auth_malformed",
            Self::AuthFailed          => "auth_failed",
            Self::ResourceMissing     => "resource_missing",
            Self::ResourceMismatch    => "resource_mismatch",
            Self::ServiceUnavailable  => "service_unavailable",
            Self::Timeout             => "timeout",
            Self::Error               => "error",
            Self::EndpointUnavailable => "endpoint_unavailable",
        }
    }

    /// Human-readable description, logged as the `reason` of each request.
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok                  => "ok",
            Self::RequestMalformed    => "request malformed",
            Self::RequestUnsupported  => "request unsupported",
            Self::MimeUnsupported     => "representation unsupported",
            Self::ActionUnavailable   => "action unavailable",
            Self::AuthMalformed       => "authentication required",
            Self::AuthFailed          => "authentication failed",
            Self::ResourceMissing     => "resource not found",
            Self::ResourceMismatch    => "resource mismatch",
            Self::ServiceUnavailable  => "service unavailable",
            Self::Timeout             => "processing timeout",
            Self::Error               => "processing error",
            Self::EndpointUnavailable => "endpoint unavailable",
        }
    }
}

/// Total mapping from an optional status to a code; no status means 500.
pub fn code_of_status(status: Option<ReplyStatus>) -> StatusCode {
    status.map_or(StatusCode::INTERNAL_SERVER_ERROR, ReplyStatus::code)
}

/// Reason phrase for `code`.
pub fn message_of_code(code: StatusCode) -> &'static str {
    code.canonical_reason().unwrap_or("Unknown Status")
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|status| status.as_str() == s).ok_or(())
    }
}
