use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{first_element, RandomSource, RawResponse};
use crate::config::Transport;
use crate::error::FetchError;

/// Builds the upstream client for the configured transport.
///
/// Both clients are cheap to share; the returned handle is used as the
/// single upstream for one fetcher.
pub fn connect(
    transport: Transport,
    timeout: Duration,
) -> Result<Arc<dyn RandomSource>, reqwest::Error> {
    let source: Arc<dyn RandomSource> = match transport {
        Transport::Async => Arc::new(ReqwestSource::new(timeout)?),
        Transport::Blocking => Arc::new(BlockingSource::new(timeout)),
    };
    Ok(source)
}

// ─── Async transport ─────────────────────────────────────────────

/// Upstream client on the async `reqwest::Client`.
pub struct ReqwestSource {
    client: reqwest::Client,
}

impl ReqwestSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RandomSource for ReqwestSource {
    async fn fetch(&self, url: &str) -> Result<RawResponse, FetchError> {
        debug!(url, "GET upstream");
        let items: Vec<RawResponse> = self.client.get(url).send().await?.json().await?;
        first_element(items)
    }
}

// ─── Blocking transport ──────────────────────────────────────────

/// Upstream client on `reqwest::blocking`, driven from tokio's blocking pool.
///
/// The blocking client owns an internal runtime, so it is built lazily on a
/// blocking thread rather than inside the async context.
pub struct BlockingSource {
    timeout: Duration,
    client: Arc<Mutex<Option<reqwest::blocking::Client>>>,
}

impl BlockingSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: Arc::new(Mutex::new(None)),
        }
    }

    fn client(
        slot: &Mutex<Option<reqwest::blocking::Client>>,
        timeout: Duration,
    ) -> Result<reqwest::blocking::Client, FetchError> {
        let mut guard = slot.lock();
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl RandomSource for BlockingSource {
    async fn fetch(&self, url: &str) -> Result<RawResponse, FetchError> {
        debug!(url, "GET upstream (blocking)");
        let slot = Arc::clone(&self.client);
        let timeout = self.timeout;
        let url = url.to_owned();

        tokio::task::spawn_blocking(move || {
            let client = Self::client(&slot, timeout)?;
            let items: Vec<RawResponse> = client.get(&url).send()?.json()?;
            first_element(items)
        })
        .await
        .map_err(|e| FetchError::Transport(format!("blocking fetch task failed: {e}")))?
    }
}
