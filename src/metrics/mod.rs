pub mod collector;
pub mod percentiles;

pub use collector::{MetricsCollector, MetricsSnapshot};

/// How a single upstream call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    RateLimited,
    Failed,
}

/// A single upstream round-trip recorded by the fetcher.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamCall {
    /// Wall time of the call including decode and validation (μs)
    pub latency_us: u64,
    pub outcome: CallOutcome,
}
