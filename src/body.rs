//! Request body handle and bounded reading.
//!
//! The body is the one part of a request that cannot be copied, so the
//! context carries a shared [`Body`] handle instead. The first reader takes
//! the stream; reading enforces the declared `Content-Length` and a timeout
//! so a slow or lying client can never park a request forever.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http::header::CONTENT_LENGTH;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::context::Context;
use crate::error::BoxError;
use crate::flow::{StepResult, Transition};

/// Default time allowed for reading a request body.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Edge taken by [`decode_json`] when the body did not arrive in time.
pub const TIMEOUT: &str = "timeout";

const MAX_PREALLOC: usize = 64 * 1024;

type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Why a body read failed.
#[derive(Debug, Error)]
pub enum BodyError {
    /// No usable `Content-Length` header.
    #[error("malformed")]
    Malformed,
    /// More bytes arrived than declared.
    #[error("overflow")]
    Overflow,
    /// The stream ended before the declared length.
    #[error("incomplete")]
    Incomplete,
    #[error("timeout")]
    Timeout,
    /// The body was already taken by an earlier step.
    #[error("consumed")]
    Consumed,
    #[error("transport: {0}")]
    Transport(BoxError),
}

/// Shared, take-once handle to the request body stream.
#[derive(Clone)]
pub struct Body {
    stream: Arc<Mutex<Option<BoxBody>>>,
    timeout: Duration,
}

impl Body {
    pub fn new<B>(body: B, timeout: Duration) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let stream: BoxBody = body.map_err(Into::into).boxed_unsync();
        Self { stream: Arc::new(Mutex::new(Some(stream))), timeout }
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    fn take(&self) -> Option<BoxBody> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

/// Reads exactly the declared `Content-Length` bytes from `body`.
pub async fn read_body(body: &Body, headers: &HeaderMap) -> Result<Bytes, BodyError> {
    let declared = headers.get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or(BodyError::Malformed)?;
    let mut stream = body.take().ok_or(BodyError::Consumed)?;

    let read = async move {
        let mut buf = BytesMut::with_capacity(declared.min(MAX_PREALLOC));

        while let Some(frame) = stream.frame().await {
            let frame = frame.map_err(BodyError::Transport)?;
            let Ok(data) = frame.into_data() else { continue };

            if buf.len() + data.len() > declared {
                return Err(BodyError::Overflow);
            }
            buf.extend_from_slice(&data);
        }

        if buf.len() < declared {
            return Err(BodyError::Incomplete);
        }
        Ok(buf.freeze())
    };

    tokio::time::timeout(body.timeout(), read)
        .await
        .map_err(|_| BodyError::Timeout)?
}

/// Step: reads the body and decodes it as a JSON object or array.
///
/// Timeouts leave on the [`TIMEOUT`] edge; every other read or decode
/// failure on the failure edge. The raw bytes are dropped on failure.
pub async fn decode_json(context: Context) -> StepResult<Context> {
    let bytes = match read_body(context.body(), context.headers()).await {
        Ok(bytes) => bytes,
        Err(BodyError::Timeout) => return Ok(Transition::named(TIMEOUT, context)),
        Err(err) => {
            debug!(reason = %err, "request body unreadable");
            return Ok(Transition::failure(context));
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            Ok(Transition::default(context.with_request_body(value)))
        }
        Ok(_) => Ok(Transition::failure(context)),
        Err(err) => {
            debug!(reason = %err, "request body is not json");
            Ok(Transition::failure(context))
        }
    }
}
