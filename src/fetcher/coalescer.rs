use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::{Fetcher, Reading, RetryPolicy};
use crate::average::RunningAverage;
use crate::error::FetchError;

type Waiter = oneshot::Sender<Result<Reading, FetchError>>;

/// On-demand fetching with request coalescing.
///
/// Callers that arrive while a fetch cycle is running join its pending set
/// instead of issuing their own upstream call; when the cycle ends every
/// waiter receives the same outcome. At most one cycle runs at a time.
///
/// Each cycle runs in its own task, so a caller giving up on its request
/// cannot cancel the cycle the other waiters depend on.
#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Fetcher,
    policy: RetryPolicy,
    max_pending: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    in_flight: bool,
    pending: Vec<Waiter>,
    average: RunningAverage,
}

impl Coalescer {
    pub fn new(fetcher: Fetcher, policy: RetryPolicy, max_pending: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                policy,
                max_pending,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Get the next sample, starting a fetch cycle if none is running.
    ///
    /// A successful cycle folds its sample into the average once; all of
    /// its waiters see the same `Reading`.
    pub async fn next(&self) -> Result<Reading, FetchError> {
        let (tx, rx) = oneshot::channel();

        let start_cycle = {
            let mut state = self.inner.state.lock();
            if state.pending.len() >= self.inner.max_pending {
                warn!(limit = self.inner.max_pending, "pending backlog full, rejecting request");
                return Err(FetchError::BacklogFull {
                    limit: self.inner.max_pending,
                });
            }
            state.pending.push(tx);
            !std::mem::replace(&mut state.in_flight, true)
        };

        if start_cycle {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.run_cycle());
        } else {
            self.inner.fetcher.metrics().record_coalesced();
        }

        rx.await.unwrap_or(Err(FetchError::Aborted))
    }

    /// Number of callers waiting on the current cycle.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn in_flight(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    pub fn state(&self) -> RunningAverage {
        self.inner.state.lock().average
    }
}

impl Inner {
    async fn run_cycle(self: Arc<Self>) {
        let guard = CycleGuard {
            inner: &self,
            completed: false,
        };
        debug!("fetch cycle started");
        let outcome = self.fetch_with_retry().await;
        guard.complete(outcome);
    }

    async fn fetch_with_retry(&self) -> Result<f64, FetchError> {
        let attempts = self.policy.attempts();

        for attempt in 1..=attempts {
            match self.fetcher.fetch_once().await {
                Err(err) if err.is_rate_limited() => {
                    debug!(attempt, attempts, "upstream rate limited");
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.interval).await;
                    }
                }
                other => return other,
            }
        }

        warn!(attempts, "upstream still rate limited, giving up");
        Err(FetchError::Exhausted { attempts })
    }

    /// Resolve every waiter with the cycle's outcome and reopen for new cycles.
    fn complete(&self, outcome: Result<f64, FetchError>) {
        let (waiters, result) = {
            let mut state = self.state.lock();
            state.in_flight = false;
            let result = outcome.map(|value| Reading {
                value,
                average: state.average.update(value),
            });
            (std::mem::take(&mut state.pending), result)
        };

        if result.is_ok() {
            self.fetcher.metrics().record_sample();
        }
        debug!(waiters = waiters.len(), ok = result.is_ok(), "fetch cycle finished");

        for waiter in waiters {
            // the caller may have gone away; nothing to do then
            let _ = waiter.send(result.clone());
        }
    }
}

/// Rejects the waiters if a cycle dies before completing.
struct CycleGuard<'a> {
    inner: &'a Inner,
    completed: bool,
}

impl CycleGuard<'_> {
    fn complete(mut self, outcome: Result<f64, FetchError>) {
        self.completed = true;
        self.inner.complete(outcome);
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let waiters = {
            let mut state = self.inner.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.pending)
        };
        error!(waiters = waiters.len(), "fetch cycle aborted");
        for waiter in waiters {
            let _ = waiter.send(Err(FetchError::Aborted));
        }
    }
}
