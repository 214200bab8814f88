//! Normalized client error.
//!
//! Every failure surfaced by the client is a [`ClientError`]: a message plus
//! an optional HTTP status, service error code and detail payload. The
//! [`ErrorKind`] says which stage failed so callers can branch without
//! string matching.
//!
//! # Normalization rules
//!
//! | Situation | Kind | Message |
//! |-----------|------|---------|
//! | deadline elapsed | `Timeout` | `Request timed out after <n>ms` |
//! | caller cancelled | `Cancelled` | `Request cancelled` |
//! | non-2xx response | `Http` | body `error`, else body `message`, else `HTTP <status>` |
//! | connection failure | `Network` | transport error text |
//! | failure after a 2xx streaming response | `Streaming` | transport error text |
//!
//! For `Http`, `code` comes from the body's `error` field and `details`
//! from its `details` field. Bodies that are empty or not JSON are
//! tolerated.

use serde_json::Value;
use std::time::Duration;

/// Which stage of the exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Cancelled,
    Http,
    Network,
    Streaming,
    /// The request could not be built locally (bad header, unreadable file, ...).
    InvalidRequest,
    /// A 2xx body did not match the typed response shape.
    UnexpectedResponse,
}

/// Error returned by every client operation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub details: Option<Value>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
            details: None,
            source: None,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Request timed out after {}ms", after.as_millis()),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Request cancelled")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn unexpected_response(err: serde_json::Error) -> Self {
        Self::new(
            ErrorKind::UnexpectedResponse,
            format!("Unexpected response shape: {}", err),
        )
        .with_source(err)
    }

    /// Transport failure before or while receiving a whole response.
    pub fn network(err: reqwest::Error) -> Self {
        Self::transport(ErrorKind::Network, err)
    }

    /// Transport failure while consuming an already accepted stream.
    pub fn streaming(err: reqwest::Error) -> Self {
        Self::transport(ErrorKind::Streaming, err)
    }

    /// A terminal `error` frame sent by the server mid-stream.
    pub fn stream_message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Streaming, message)
    }

    fn transport(kind: ErrorKind, err: reqwest::Error) -> Self {
        let details = serde_json::json!({ "source": format!("{:?}", err) });
        let mut error = Self::new(kind, err.to_string()).with_source(err);
        error.details = Some(details);
        error
    }

    /// Build an `Http` error from a non-2xx status and its raw body.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let code = field("error");
        let message = code
            .clone()
            .or_else(|| field("message"))
            .unwrap_or_else(|| format!("HTTP {}", status));
        let details = parsed
            .as_ref()
            .and_then(|v| v.get("details"))
            .cloned();

        let mut error = Self::new(ErrorKind::Http, message);
        error.status = Some(status);
        error.code = code;
        error.details = details;
        error
    }

    fn with_source(mut self, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(err));
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_status(&self, status: u16) -> bool {
        self.status == Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insufficient_credits_body() {
        let body = br#"{"error":"INSUFFICIENT_CREDITS","details":{"required":1,"available":0}}"#;
        let err = ClientError::from_response(402, body);
        assert_eq!(err.kind, ErrorKind::Http);
        assert_eq!(err.status, Some(402));
        assert_eq!(err.code.as_deref(), Some("INSUFFICIENT_CREDITS"));
        assert_eq!(err.details, Some(json!({"required": 1, "available": 0})));
        assert_eq!(err.message, "INSUFFICIENT_CREDITS");
        assert!(err.is_status(402));
    }

    #[test]
    fn test_message_field_used_when_no_error() {
        let err = ClientError::from_response(400, br#"{"message":"question is required"}"#);
        assert_eq!(err.message, "question is required");
        assert_eq!(err.code, None);
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn test_error_field_wins_over_message() {
        let err = ClientError::from_response(
            400,
            br#"{"error":"BAD_REQUEST","message":"datasetId missing"}"#,
        );
        assert_eq!(err.message, "BAD_REQUEST");
        assert_eq!(err.code.as_deref(), Some("BAD_REQUEST"));
    }

    #[test]
    fn test_empty_body_falls_back_to_status() {
        let err = ClientError::from_response(503, b"");
        assert_eq!(err.message, "HTTP 503");
        assert_eq!(err.status, Some(503));
        assert!(err.code.is_none());
        assert!(err.details.is_none());
    }

    #[test]
    fn test_non_json_body_falls_back_to_status() {
        let err = ClientError::from_response(502, b"<html>Bad Gateway</html>");
        assert_eq!(err.message, "HTTP 502");
        assert_eq!(err.to_string(), "HTTP 502");
    }

    #[test]
    fn test_non_string_error_field_ignored() {
        let err = ClientError::from_response(500, br#"{"error":{"nested":true}}"#);
        assert_eq!(err.message, "HTTP 500");
        assert!(err.code.is_none());
    }

    #[test]
    fn test_timeout_message() {
        let err = ClientError::timeout(Duration::from_millis(1500));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Request timed out after 1500ms");
        assert!(err.status.is_none());
    }

    #[test]
    fn test_cancelled_is_not_timeout() {
        let err = ClientError::cancelled();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_unexpected_response_keeps_source() {
        let serde_err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = ClientError::unexpected_response(serde_err);
        assert_eq!(err.kind, ErrorKind::UnexpectedResponse);
        assert!(std::error::Error::source(&err).is_some());
    }
}
