//! Fetch coordination: one shared single-attempt routine, driven either by
//! an on-demand coalescer or by a background poller.

pub mod coalescer;
pub mod poller;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::average::RunningAverage;
use crate::error::FetchError;
use crate::metrics::{CallOutcome, MetricsCollector, UpstreamCall};
use crate::upstream::RandomSource;

pub use coalescer::Coalescer;
pub use poller::Poller;

/// Fixed-delay retry for rate-limited fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// Total time a coalesced cycle may spend retrying.
    pub budget: Duration,
}

impl RetryPolicy {
    /// `floor(budget / interval) + 1`: the 1 s / 200 ms default gives 6.
    pub fn attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        u32::try_from(self.budget.as_millis() / interval)
            .unwrap_or(u32::MAX)
            .saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            budget: Duration::from_millis(1000),
        }
    }
}

/// A folded sample together with the average it produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub average: f64,
}

/// The upstream client bound to its URL. Performs exactly one attempt.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn RandomSource>,
    url: String,
    metrics: Arc<MetricsCollector>,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn RandomSource>,
        url: impl Into<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            source,
            url: url.into(),
            metrics,
        }
    }

    /// Fetch, validate and classify one upstream answer.
    pub async fn fetch_once(&self) -> Result<f64, FetchError> {
        let t0 = Instant::now();
        let result = match self.source.fetch(&self.url).await {
            Ok(raw) => raw.into_response().and_then(|resp| resp.into_value()),
            Err(err) => Err(err),
        };

        let outcome = match &result {
            Ok(_) => CallOutcome::Success,
            Err(err) if err.is_rate_limited() => CallOutcome::RateLimited,
            Err(_) => CallOutcome::Failed,
        };
        self.metrics.record_call(UpstreamCall {
            latency_us: t0.elapsed().as_micros() as u64,
            outcome,
        });

        result
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }
}

/// The averaging service behind the HTTP facade, in whichever mode the
/// deployment selected.
#[derive(Clone)]
pub enum AverageService {
    OnDemand(Coalescer),
    Polling(Poller),
}

impl AverageService {
    /// The average to report for one inbound request.
    pub async fn current_average(&self) -> Result<f64, FetchError> {
        match self {
            Self::OnDemand(coalescer) => coalescer.next().await.map(|r| r.average),
            Self::Polling(poller) => Ok(poller.average()),
        }
    }

    pub fn state(&self) -> RunningAverage {
        match self {
            Self::OnDemand(coalescer) => coalescer.state(),
            Self::Polling(poller) => poller.state(),
        }
    }

    /// Stop background work, waiting for the poll loop to exit.
    pub async fn shutdown(&self) {
        if let Self::Polling(poller) = self {
            poller.shutdown().await;
        }
    }
}
