//! Error types for scorefill-http

use std::time::Duration;

use scorefill_core::CallError;
use thiserror::Error;

/// Errors raised while talking to a remote service
#[derive(Error, Debug)]
pub enum ClientError {
    /// Request exceeded its timeout bound
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or protocol failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status where the body carries no usable answer
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Body did not decode
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Classify a send/receive failure, keeping the bound that was hit.
    pub(crate) fn from_send(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(timeout)
        } else {
            ClientError::Http(err)
        }
    }
}

impl From<ClientError> for CallError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Timeout(d) => CallError::Timeout(d),
            ClientError::Http(e) => CallError::Transport(e.to_string()),
            ClientError::Status(code) => CallError::Status(code),
            ClientError::Json(e) => CallError::Malformed(e.to_string()),
        }
    }
}
