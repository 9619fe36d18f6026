//! Error taxonomy for the backfill engine.
//!
//! Per-call failures (`CallError`) are always absorbed by the loop and only
//! change counters. `ConfigError` is the single fatal class and must surface
//! before the first iteration.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single collaborator call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// Connection refused, DNS failure, reset, etc.
    #[error("transport error: {0}")]
    Transport(String),

    /// Call exceeded its timeout bound
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx status without a decodable body
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Body did not decode into the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Collaborator answered `success: false` with an unrecognised error
    #[error("rejected by collaborator: {0}")]
    Rejected(String),
}

impl CallError {
    /// Map onto the coarse failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            CallError::Malformed(_) => FailureKind::MalformedResponse,
            CallError::Transport(_)
            | CallError::Timeout(_)
            | CallError::Status(_)
            | CallError::Rejected(_) => FailureKind::TransportError,
        }
    }
}

/// Coarse classification of an attempt that did not add a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    TransportError,
    MalformedResponse,
    DomainNotFound,
    DomainNullScore,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransportError => "transport_error",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::DomainNotFound => "not_found",
            FailureKind::DomainNullScore => "null_score",
        }
    }
}

/// Startup configuration errors. These halt the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required credential {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid range table: {0}")]
    InvalidRangeTable(String),

    #[error("invalid backfill config: {0}")]
    Invalid(String),

    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),
}
