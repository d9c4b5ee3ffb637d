use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::LatencySummary;
use super::{CallOutcome, UpstreamCall};

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 5 min, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 300_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe upstream statistics.
/// The fetcher calls `record_*()`, the stats endpoint calls `snapshot()`.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

/// Point-in-time view served by `GET /api/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub upstream_calls: u64,
    pub successes: u64,
    pub rate_limited: u64,
    pub failures: u64,
    /// Requests that joined a fetch cycle already in flight
    pub coalesced_requests: u64,
    pub latency: LatencySummary,
    pub last_sample_at: Option<DateTime<Utc>>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    latency_hist: Histogram<u64>,
    upstream_calls: u64,
    successes: u64,
    rate_limited: u64,
    failures: u64,
    coalesced_requests: u64,
    last_sample_at: Option<DateTime<Utc>>,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn record_call(&self, call: UpstreamCall) {
        let mut inner = self.inner.lock();
        inner.upstream_calls += 1;
        match call.outcome {
            CallOutcome::Success => inner.successes += 1,
            CallOutcome::RateLimited => inner.rate_limited += 1,
            CallOutcome::Failed => inner.failures += 1,
        }
        // clamp to ≥ 1 μs so the histogram accepts it
        let _ = inner.latency_hist.record(call.latency_us.max(1));
    }

    pub fn record_coalesced(&self) {
        self.inner.lock().coalesced_requests += 1;
    }

    /// Marks the moment a sample was folded into the average.
    pub fn record_sample(&self) {
        self.inner.lock().last_sample_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            upstream_calls: inner.upstream_calls,
            successes: inner.successes,
            rate_limited: inner.rate_limited,
            failures: inner.failures,
            coalesced_requests: inner.coalesced_requests,
            latency: LatencySummary::from_histogram(&inner.latency_hist),
            last_sample_at: inner.last_sample_at,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn new() -> Self {
        Self {
            latency_hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            upstream_calls: 0,
            successes: 0,
            rate_limited: 0,
            failures: 0,
            coalesced_requests: 0,
            last_sample_at: None,
        }
    }
}
