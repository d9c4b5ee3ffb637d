use axum::http::StatusCode;
use thiserror::Error;

use crate::upstream::RawResponse;

/// Upstream error codes as sent in the `code` field of an error response.
pub const CODE_TOO_MANY_REQUESTS: i64 = 5;
pub const CODE_BAD_REQUEST: i64 = 6;
pub const CODE_SERVICE_UNAVAILABLE: i64 = 7;

// ─── Classified upstream errors ──────────────────────────────────

/// Taxonomy of upstream-reported failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimited,
    BadRequest,
    ServiceUnavailable,
    Unknown,
}

impl ErrorKind {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(CODE_TOO_MANY_REQUESTS) => Self::RateLimited,
            Some(CODE_BAD_REQUEST) => Self::BadRequest,
            Some(CODE_SERVICE_UNAVAILABLE) => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }

    /// HTTP status the facade answers with for this kind.
    pub fn status(self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_message(self) -> Option<&'static str> {
        match self {
            Self::RateLimited => Some("too many requests"),
            Self::BadRequest => Some("bad request"),
            Self::ServiceUnavailable => Some("service unavailable"),
            Self::Unknown => None,
        }
    }
}

/// An error response from the upstream, classified by its code.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: ErrorKind,
    pub message: String,
    pub response: RawResponse,
}

impl UpstreamError {
    /// Classify an upstream error response. The upstream's `reason` wins
    /// over the per-kind default; unknown codes embed the raw response.
    pub fn from_response(response: &RawResponse) -> Self {
        let kind = ErrorKind::from_code(response.code_number());

        let message = match kind.default_message() {
            Some(default) => response
                .reason
                .clone()
                .filter(|reason| !reason.is_empty())
                .unwrap_or_else(|| default.to_owned()),
            None => format!(
                "invalid server response: {}",
                serde_json::to_string(response).unwrap_or_default()
            ),
        };

        Self {
            kind,
            message,
            response: response.clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

// ─── Fetch errors ────────────────────────────────────────────────

/// Everything that can go wrong while obtaining a sample.
///
/// `Clone` because a single coalesced fetch cycle hands the same outcome
/// to every waiting caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid server response: empty array")]
    EmptyResponse,

    #[error("{0}")]
    Malformed(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("failed to fetch after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("too many pending requests (limit {limit})")]
    BacklogFull { limit: usize },

    #[error("fetch cycle ended without an outcome")]
    Aborted,
}

impl FetchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Upstream(err) => err.status(),
            Self::BacklogFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Upstream(err) if err.kind == ErrorKind::RateLimited)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
