//! Upstream random-number service: wire types and the client seam.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, UpstreamError};
use crate::validate;

pub use http::{connect, BlockingSource, ReqwestSource};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

// ─── Wire format ─────────────────────────────────────────────────

/// One element of the upstream's JSON array, decoded leniently so the
/// validator can reject bad shapes with a precise message.
///
/// `code` stays a raw JSON value: the upstream has been seen sending it
/// both as a number and as a numeric string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RawResponse {
    /// The error code as a number, if it is one (or a string holding one).
    pub fn code_number(&self) -> Option<i64> {
        match self.code.as_ref()? {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Validate the shape and translate into the typed response.
    pub fn into_response(self) -> Result<UpstreamResponse, FetchError> {
        validate::validate(&self)?;

        match (self.status.as_deref(), self.random) {
            (Some(STATUS_SUCCESS), Some(value)) => Ok(UpstreamResponse::Success {
                value,
                min: self.min,
                max: self.max,
            }),
            _ => Ok(UpstreamResponse::Failure(UpstreamError::from_response(&self))),
        }
    }
}

/// A validated upstream answer.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamResponse {
    Success {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    Failure(UpstreamError),
}

impl UpstreamResponse {
    /// Collapse into the sample value, turning upstream failures into errors.
    pub fn into_value(self) -> Result<f64, FetchError> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failure(err) => Err(err.into()),
        }
    }
}

/// Pick the single element out of the upstream's one-element array.
pub(crate) fn first_element(items: Vec<RawResponse>) -> Result<RawResponse, FetchError> {
    items.into_iter().next().ok_or(FetchError::EmptyResponse)
}

// ─── Client seam ─────────────────────────────────────────────────

/// Performs a single GET against the upstream and returns the first
/// element of the decoded array.
#[async_trait]
pub trait RandomSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawResponse, FetchError>;
}
