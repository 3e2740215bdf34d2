//! Unified error type.

use thiserror::Error;

/// A boxed error, as returned by controller actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by switchyard's fallible operations.
///
/// Expected request outcomes (no route, unsupported method, malformed body,
/// a missing resource) are never `Error`s: they are named transitions with a
/// [`ReplyStatus`](crate::ReplyStatus). This type surfaces the unhandled
/// faults: an action that failed, a view the encoder could not serialise,
/// and infrastructure failures such as binding a port.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("action failed: {0}")]
    Action(BoxError),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Wraps any error raised inside a controller action.
    pub fn action(err: impl Into<BoxError>) -> Self {
        Self::Action(err.into())
    }
}
