//! HTTP service reporting a running average of samples drawn from a
//! rate-limited random-number upstream.

use std::sync::Arc;

pub mod average;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod upstream;
pub mod validate;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

use config::{Config, FetchMode};
use fetcher::{AverageService, Coalescer, Fetcher, Poller};
use metrics::MetricsCollector;
use upstream::RandomSource;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Averaging core, in the configured fetch mode.
    pub service: AverageService,

    /// Upstream call statistics; the fetcher pushes, `/api/stats` reads.
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// Connects the configured upstream transport and builds the state.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let source = upstream::connect(config.transport, config.upstream_timeout)?;
        Ok(Self::with_source(config, source))
    }

    /// Builds the state around an already constructed upstream client.
    ///
    /// In poll mode the loop is started here unless `loop_stopped` is set,
    /// so this must run inside a tokio runtime.
    pub fn with_source(config: &Config, source: Arc<dyn RandomSource>) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let fetcher = Fetcher::new(source, config.upstream_url.clone(), Arc::clone(&metrics));

        let service = match config.mode {
            FetchMode::OnDemand => AverageService::OnDemand(Coalescer::new(
                fetcher,
                config.retry_policy(),
                config.max_pending,
            )),
            FetchMode::Poll => {
                let poller = Poller::new(fetcher, config.poll_interval, config.retry_interval);
                if !config.loop_stopped {
                    poller.start();
                }
                AverageService::Polling(poller)
            }
        };

        Self { service, metrics }
    }
}
