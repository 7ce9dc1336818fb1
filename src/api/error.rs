use crate::auth::error::AuthError;
use crate::transport::error::TransportError;
use crate::types::error::DataError;
use thiserror::Error;

/// Coarse classification of an [`ApiError`], for callers deciding what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// Token missing, invalid or refused even after one renewal.
    Auth,
    /// Per-user or per-application request quota reached. Never retried here.
    RateLimit,
    /// Unknown device or module.
    NotFound,
    /// Network failure or an unexpected HTTP status. A caller may retry with backoff.
    Transport,
    /// The response could not be decoded or lacks required fields.
    Malformed,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Token(#[from] AuthError),

    #[error("Request to {url} was refused with status {status}: {reason}")]
    Unauthorized {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("Rate limit reached for {url}: {reason}")]
    RateLimited { url: String, reason: String },

    #[error("Not found at {url}: {reason}")]
    NotFound { url: String, reason: String },

    #[error("HTTP request failed for {url} with status {status}: {reason}")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to parse JSON response from {url}")]
    JsonParse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Invalid data in response from {url}")]
    InvalidData {
        url: String,
        #[source]
        source: DataError,
    },
}

impl ApiError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ApiError::Token(_) | ApiError::Unauthorized { .. } => ApiErrorKind::Auth,
            ApiError::RateLimited { .. } => ApiErrorKind::RateLimit,
            ApiError::NotFound { .. } => ApiErrorKind::NotFound,
            ApiError::HttpStatus { .. } | ApiError::Transport(_) => ApiErrorKind::Transport,
            ApiError::JsonParse { .. }
            | ApiError::Malformed { .. }
            | ApiError::InvalidData { .. } => ApiErrorKind::Malformed,
        }
    }
}
