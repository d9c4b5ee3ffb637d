use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Fetcher;
use crate::average::RunningAverage;
use crate::error::FetchError;

/// Background polling: a loop keeps the running average fresh and readers
/// get the latest value without touching the network.
///
/// After a rate-limited tick the loop sleeps `retry_interval` instead of
/// `poll_interval`. Any other failure is logged and the loop carries on.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Fetcher,
    poll_interval: Duration,
    retry_interval: Duration,

    /// Checked by the loop before every tick.
    running: AtomicBool,
    /// Bumped by every `start()`; a loop from an older start exits.
    generation: AtomicU64,

    average: Mutex<RunningAverage>,
    /// Serialises ticks so only one upstream call is ever in flight.
    tick_lock: tokio::sync::Mutex<()>,
    /// Held by the live loop for its whole lifetime.
    loop_lock: tokio::sync::Mutex<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(fetcher: Fetcher, poll_interval: Duration, retry_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                poll_interval,
                retry_interval,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                average: Mutex::new(RunningAverage::new()),
                tick_lock: tokio::sync::Mutex::new(()),
                loop_lock: tokio::sync::Mutex::new(()),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Spawn the poll loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            poll_ms = self.inner.poll_interval.as_millis() as u64,
            retry_ms = self.inner.retry_interval.as_millis() as u64,
            "poll loop starting"
        );

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.run(generation));
        *self.inner.handle.lock() = Some(handle);
        true
    }

    /// Ask the loop to stop. A tick or sleep already underway completes.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the loop task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            // a panicked loop has nothing left to clean up
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// One fetch + fold. Returns the new average.
    pub async fn tick(&self) -> Result<f64, FetchError> {
        self.inner.tick().await
    }

    /// Latest average; `0.0` until the first successful tick.
    pub fn average(&self) -> f64 {
        self.inner.average.lock().mean()
    }

    pub fn state(&self) -> RunningAverage {
        *self.inner.average.lock()
    }
}

impl Inner {
    async fn run(self: Arc<Self>, generation: u64) {
        // wait out a loop from a previous start() that has not exited yet
        let _live = self.loop_lock.lock().await;
        let guard = LoopGuard {
            inner: &self,
            generation,
            finished: false,
        };

        while self.is_current(generation) {
            let interval = match self.tick().await {
                Ok(average) => {
                    debug!(average, "tick");
                    self.poll_interval
                }
                Err(err) if err.is_rate_limited() => {
                    let interval = self.retry_interval;
                    warn!(interval_ms = interval.as_millis() as u64, "rate limited, retrying");
                    interval
                }
                Err(err) => {
                    error!(error = %err, "tick failed");
                    self.poll_interval
                }
            };

            tokio::time::sleep(interval).await;
        }

        guard.finish();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn tick(&self) -> Result<f64, FetchError> {
        let _in_flight = self.tick_lock.lock().await;
        let value = self.fetcher.fetch_once().await?;

        let average = self.average.lock().update(value);
        self.fetcher.metrics().record_sample();
        Ok(average)
    }
}

/// Clears `running` if the loop task dies while it is still the live loop,
/// so `start()` can bring polling back.
struct LoopGuard<'a> {
    inner: &'a Inner,
    generation: u64,
    finished: bool,
}

impl LoopGuard<'_> {
    fn finish(mut self) {
        self.finished = true;
        debug!(generation = self.generation, "poll loop exited");
    }
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // a newer start() owns the flag now
        if self.inner.generation.load(Ordering::SeqCst) == self.generation {
            self.inner.running.store(false, Ordering::SeqCst);
        }
        error!(generation = self.generation, "poll loop aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CODE_SERVICE_UNAVAILABLE;
    use crate::metrics::MetricsCollector;
    use crate::testkit::{failure, malformed, rate_limited, success, ScriptedSource};
    use crate::upstream::{RandomSource, RawResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn poller(source: Arc<dyn RandomSource>, poll_ms: u64) -> Poller {
        let fetcher = Fetcher::new(source, "http://upstream.test/", Arc::new(MetricsCollector::new()));
        Poller::new(
            fetcher,
            Duration::from_millis(poll_ms),
            Duration::from_millis(200),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn average_is_zero_before_first_tick() {
        let p = poller(Arc::new(ScriptedSource::new([success(42.0)])), 1000);
        assert_eq!(p.average(), 0.0);
        assert!(!p.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_ticks_fold_samples() {
        let p = poller(Arc::new(ScriptedSource::new([success(42.0), success(21.0)])), 1000);

        assert_eq!(p.tick().await, Ok(42.0));
        assert_eq!(p.average(), 42.0);
        assert_eq!(p.tick().await, Ok(31.5));
        assert_eq!(p.state().count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_leave_average_untouched() {
        let p = poller(
            Arc::new(ScriptedSource::new([
                success(10.0),
                malformed(r#"{"status":"success"}"#),
                failure(CODE_SERVICE_UNAVAILABLE, None),
            ])),
            1000,
        );

        p.tick().await.unwrap();
        assert!(matches!(p.tick().await, Err(FetchError::Malformed(_))));
        assert_eq!(p.tick().await.unwrap_err().to_string(), "service unavailable");
        assert_eq!(p.state().count(), 1);
        assert_eq!(p.average(), 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_retries_sooner_after_rate_limit() {
        let source = Arc::new(ScriptedSource::new([
            success(42.0),
            rate_limited(),
            success(21.0),
        ]));
        let p = poller(source.clone(), 100);

        assert!(p.start());
        assert!(!p.start());
        // ticks at 0 (42), 100 (rate limited), 300 (21), 400 (script exhausted)
        tokio::time::sleep(Duration::from_millis(450)).await;
        p.shutdown().await;

        assert_eq!(p.average(), 31.5);
        assert_eq!(source.calls(), 4);
        assert!(!p.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_terminal_errors() {
        let source = Arc::new(ScriptedSource::new([
            failure(CODE_SERVICE_UNAVAILABLE, Some("down")),
            success(8.0),
        ]));
        let p = poller(source.clone(), 100);

        p.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        p.shutdown().await;

        assert_eq!(p.average(), 8.0);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_a_single_loop() {
        let mut script = Vec::new();
        for i in 0..20 {
            script.push(success(i as f64));
        }
        let source = Arc::new(ScriptedSource::new(script));
        let p = poller(source.clone(), 100);

        p.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        p.stop();
        assert!(p.start());
        tokio::time::sleep(Duration::from_millis(320)).await;
        p.shutdown().await;

        // one tick at 0, then the restarted loop ticks at 100, 200, 300
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_the_in_flight_tick_finish() {
        let source = Arc::new(
            ScriptedSource::new([success(9.0), success(1.0)])
                .with_latency(Duration::from_millis(100)),
        );
        let p = poller(source.clone(), 1000);

        p.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        p.shutdown().await;

        assert_eq!(p.average(), 9.0);
        assert_eq!(source.calls(), 1);
        assert!(!p.is_running());
    }

    /// Counts overlapping `fetch` calls.
    struct OverlapSource {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl RandomSource for OverlapSource {
        async fn fetch(&self, _url: &str) -> Result<RawResponse, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(success(5.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn manual_ticks_never_overlap_the_loop() {
        let source = Arc::new(OverlapSource {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let p = poller(source.clone(), 10);

        p.start();
        let ticks: Vec<_> = (0..3)
            .map(|_| {
                let p = p.clone();
                tokio::spawn(async move { p.tick().await })
            })
            .collect();
        for tick in ticks {
            assert_eq!(tick.await.unwrap(), Ok(5.0));
        }
        p.shutdown().await;

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(p.average(), 5.0);
    }

    /// Panics on the first call, then answers normally.
    struct PanicOnceSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RandomSource for PanicOnceSource {
        async fn fetch(&self, _url: &str) -> Result<RawResponse, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("upstream client blew up");
            }
            Ok(success(7.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_loop_can_be_restarted() {
        let source = Arc::new(PanicOnceSource {
            calls: AtomicUsize::new(0),
        });
        let p = poller(source, 100);

        assert!(p.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!p.is_running());

        assert!(p.start());
        assert!(p.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        p.shutdown().await;

        assert_eq!(p.average(), 7.0);
    }
}
