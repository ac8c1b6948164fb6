use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::{stream, StreamExt};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use reqwest::{Method, StatusCode};

pub mod backend;
pub use backend::ReqwestBackend;

pub mod retry;
pub use retry::{backoff_delay, RetryingTransport};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Response body as it arrives off the wire.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// Network failure, 429 or 5xx: retried until the budget runs out.
    TransientNetwork,
    /// 4xx other than 429: the request itself is wrong.
    ClientRejected,
    /// The body arrived but could not be decoded.
    Decode,
    /// 1xx or 3xx where a 2xx was expected. Not retried.
    UnexpectedStatus,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::TransientNetwork => "transient network failure",
            TransportErrorKind::ClientRejected => "request rejected",
            TransportErrorKind::Decode => "decode failure",
            TransportErrorKind::UnexpectedStatus => "unexpected status",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Error)]
#[error("{kind}: {cause}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<StatusCode>,
    pub cause: String,
}

impl TransportError {
    pub fn network(cause: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::TransientNetwork,
            status: None,
            cause: cause.into(),
        }
    }

    pub fn decode(cause: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Decode,
            status: None,
            cause: cause.into(),
        }
    }

    /// Classify a non-2xx response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let kind = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            TransportErrorKind::TransientNetwork
        } else if status.is_client_error() {
            TransportErrorKind::ClientRejected
        } else {
            TransportErrorKind::UnexpectedStatus
        };
        let mut cause = format!("HTTP status {status}");
        if !body.is_empty() {
            cause.push_str(" - ");
            cause.push_str(body);
        }
        Self {
            kind,
            status: Some(status),
            cause,
        }
    }

    pub fn exhausted() -> Self {
        Self::network("request failed after retries")
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == TransportErrorKind::TransientNetwork
    }
}

/// One logical request. Immutable once handed to the transport.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    pub method: Method,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub retries: u32,
    pub backoff_base: Duration,
}

impl RequestDescriptor {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: None,
            retries: DEFAULT_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }
}

/// Status plus a lazily consumed body.
pub struct Response {
    status: StatusCode,
    body: ByteStream,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response").field("status", &self.status).finish_non_exhaustive()
    }
}

impl Response {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// Build a response whose body arrives in the given chunks.
    pub fn from_chunks<I, B>(status: StatusCode, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, TransportError>> =
            chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::new(status, Box::pin(stream::iter(chunks)))
    }

    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::from_chunks(status, [body.into()])
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub async fn bytes(mut self) -> Result<Bytes, TransportError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    pub async fn text(self) -> Result<String, TransportError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::decode(format!("parse error: {e}")))
    }

    pub fn into_byte_stream(self) -> ByteStream {
        self.body
    }
}

/// The network primitive. Only network-level failures are errors; any HTTP
/// status comes back as a `Response`.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn send(&self, req: &RequestDescriptor) -> Result<Response, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        let rejected = TransportError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad days");
        assert_eq!(rejected.kind, TransportErrorKind::ClientRejected);
        assert!(rejected.cause.contains("bad days"));

        let limited = TransportError::from_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(limited.is_retryable());

        let unavailable = TransportError::from_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status, Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn informational_and_redirect_statuses_are_final() {
        for status in [StatusCode::CONTINUE, StatusCode::MOVED_PERMANENTLY, StatusCode::NOT_MODIFIED] {
            let err = TransportError::from_status(status, "");
            assert_eq!(err.kind, TransportErrorKind::UnexpectedStatus);
            assert!(!err.is_retryable());
        }
    }

    #[tokio::test]
    async fn json_body_collects_all_chunks() {
        let resp = Response::from_chunks(StatusCode::OK, [&b"{\"a\":"[..], &b" 1}"[..]]);
        let value: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let resp = Response::from_bytes(StatusCode::OK, "not json");
        let err = resp.json::<serde_json::Value>().await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Decode);
    }
}
