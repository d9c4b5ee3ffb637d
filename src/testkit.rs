//! Test doubles for the upstream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{FetchError, CODE_TOO_MANY_REQUESTS};
use crate::upstream::{RandomSource, RawResponse, STATUS_ERROR, STATUS_SUCCESS};

/// Replays a fixed script of upstream outcomes, one per call.
///
/// Once the script runs out every call fails with a transport error.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<RawResponse, FetchError>>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedSource {
    pub fn new(responses: impl IntoIterator<Item = RawResponse>) -> Self {
        Self::with_outcomes(responses.into_iter().map(Ok))
    }

    pub fn with_outcomes(
        outcomes: impl IntoIterator<Item = Result<RawResponse, FetchError>>,
    ) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency` (tokio time, so it honours paused clocks).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, response: RawResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RandomSource for ScriptedSource {
    async fn fetch(&self, _url: &str) -> Result<RawResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Err(FetchError::Transport("no scripted response".into())))
    }
}

pub fn success(value: f64) -> RawResponse {
    RawResponse {
        status: Some(STATUS_SUCCESS.into()),
        min: Some(0.0),
        max: Some(100.0),
        random: Some(value),
        ..Default::default()
    }
}

pub fn failure(code: i64, reason: Option<&str>) -> RawResponse {
    RawResponse {
        status: Some(STATUS_ERROR.into()),
        code: Some(code.into()),
        reason: reason.map(str::to_owned),
        ..Default::default()
    }
}

pub fn rate_limited() -> RawResponse {
    failure(CODE_TOO_MANY_REQUESTS, None)
}

/// Decode an arbitrary element, e.g. one with a missing field.
///
/// Panics on invalid JSON; meant for fixtures only.
pub fn malformed(json: &str) -> RawResponse {
    serde_json::from_str(json).expect("fixture must be valid JSON")
}
