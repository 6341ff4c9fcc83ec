//! Interval-driven batch runner shared by every background poller.
//!
//! [`IntervalBatchRunner`] owns a single Tokio task that ticks on a fixed
//! interval and invokes a caller-supplied batch function. At most one
//! batch is ever in flight: the timer loop awaits each batch, and manual
//! [`IntervalBatchRunner::tick`] calls (e.g. an operator "run now") are
//! rejected while another batch is running. Errors and panics from the
//! batch are logged and recorded in the runner's snapshot; they never
//! terminate the timer.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::types::Timestamp;

/// Shortest interval accepted; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Boxed future returned by a batch function: the number of items processed.
pub type BatchFuture = Pin<Box<dyn Future<Output = anyhow::Result<usize>> + Send>>;

type BatchFn = Box<dyn Fn() -> BatchFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of a runner, for logs and status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerSnapshot {
    pub name: String,
    pub interval_secs: u64,
    pub is_running: bool,
    pub in_flight: bool,
    pub last_run_at: Option<Timestamp>,
    pub last_success_at: Option<Timestamp>,
    pub last_error_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub total_processed: u64,
}

#[derive(Debug, Default)]
struct RunnerStats {
    last_run_at: Option<Timestamp>,
    last_success_at: Option<Timestamp>,
    last_error_at: Option<Timestamp>,
    last_error: Option<String>,
    consecutive_failures: u32,
    total_processed: u64,
}

struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    name: String,
    interval: Duration,
    batch: BatchFn,
    in_flight: AtomicBool,
    stats: Mutex<RunnerStats>,
    timer: Mutex<Option<TimerHandle>>,
}

/// Clears the in-flight flag when a tick finishes, even if the tick future
/// is dropped part way through.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// IntervalBatchRunner
// ---------------------------------------------------------------------------

/// Runs a batch function on a fixed interval with a non-overlap guarantee.
///
/// Cloning is cheap; all clones drive the same timer and share the same
/// in-flight guard.
#[derive(Clone)]
pub struct IntervalBatchRunner {
    inner: Arc<Inner>,
}

impl IntervalBatchRunner {
    /// Create a stopped runner. Call [`start`](Self::start) to begin ticking.
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, batch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<usize>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                interval: interval.max(MIN_INTERVAL),
                batch: Box::new(move || Box::pin(batch())),
                in_flight: AtomicBool::new(false),
                stats: Mutex::new(RunnerStats::default()),
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start the timer. The first batch runs immediately.
    ///
    /// Calling `start` on a runner that is already running is a no-op.
    pub fn start(&self) {
        let mut timer = lock(&self.inner.timer);
        if timer.as_ref().is_some_and(|t| !t.task.is_finished()) {
            tracing::debug!(runner = %self.inner.name, "Runner already started");
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.tick().await;
                    }
                }
            }

            tracing::info!(runner = %inner.name, "Runner stopped");
        });

        tracing::info!(
            runner = %self.inner.name,
            interval_ms = self.inner.interval.as_millis() as u64,
            "Runner started",
        );

        *timer = Some(TimerHandle { cancel, task });
    }

    /// Cancel the timer. A batch that is already in flight is allowed to
    /// finish; no further batches are started by the timer.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.inner.timer).take() {
            handle.cancel.cancel();
        }
    }

    /// Stop the timer and wait (bounded by `timeout`) for an in-flight
    /// batch to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        let handle = lock(&self.inner.timer).take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            if tokio::time::timeout(timeout, handle.task).await.is_err() {
                tracing::warn!(
                    runner = %self.inner.name,
                    timeout_secs = timeout.as_secs(),
                    "Runner did not stop within timeout",
                );
            }
        }
    }

    /// Run one batch now unless another batch is in flight.
    ///
    /// Returns the number of items the batch processed, or 0 when the tick
    /// was skipped or the batch failed.
    pub async fn tick(&self) -> usize {
        self.inner.tick().await
    }

    /// Whether the timer is active.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .is_some_and(|t| !t.task.is_finished())
    }

    /// Whether a batch is executing right now.
    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RunnerSnapshot {
        let stats = lock(&self.inner.stats);
        RunnerSnapshot {
            name: self.inner.name.clone(),
            interval_secs: self.inner.interval.as_secs(),
            is_running: self.is_running(),
            in_flight: self.is_in_flight(),
            last_run_at: stats.last_run_at,
            last_success_at: stats.last_success_at,
            last_error_at: stats.last_error_at,
            last_error: stats.last_error.clone(),
            consecutive_failures: stats.consecutive_failures,
            total_processed: stats.total_processed,
        }
    }
}

impl Inner {
    async fn tick(&self) -> usize {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(runner = %self.name, "Previous batch still in flight, skipping tick");
            return 0;
        }
        let _guard = InFlightGuard(&self.in_flight);

        lock(&self.stats).last_run_at = Some(Utc::now());

        // The closure may panic before it hands back a future.
        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.batch)())) {
            Ok(batch) => AssertUnwindSafe(batch).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match result {
            Ok(Ok(processed)) => {
                let mut stats = lock(&self.stats);
                if stats.consecutive_failures > 0 {
                    tracing::info!(
                        runner = %self.name,
                        prev_failures = stats.consecutive_failures,
                        "Runner recovered",
                    );
                }
                stats.consecutive_failures = 0;
                stats.last_success_at = Some(Utc::now());
                stats.total_processed += processed as u64;
                drop(stats);

                if processed > 0 {
                    tracing::info!(runner = %self.name, processed, "Batch completed");
                } else {
                    tracing::debug!(runner = %self.name, "Batch completed, nothing due");
                }
                processed
            }
            Ok(Err(e)) => {
                let failures = self.record_failure(format!("{e:#}"));
                tracing::error!(
                    runner = %self.name,
                    error = %e,
                    consecutive_failures = failures,
                    "Batch failed",
                );
                0
            }
            Err(_) => {
                let failures = self.record_failure("batch panicked".to_string());
                tracing::error!(
                    runner = %self.name,
                    consecutive_failures = failures,
                    "Batch panicked",
                );
                0
            }
        }
    }

    fn record_failure(&self, message: String) -> u32 {
        let mut stats = lock(&self.stats);
        stats.consecutive_failures += 1;
        stats.last_error_at = Some(Utc::now());
        stats.last_error = Some(message);
        stats.consecutive_failures
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Notify;

    use super::*;

    const INTERVAL: Duration = Duration::from_secs(10);

    fn counting_runner(calls: Arc<AtomicUsize>) -> IntervalBatchRunner {
        IntervalBatchRunner::new("counting", INTERVAL, move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        })
    }

    #[tokio::test]
    async fn concurrent_tick_does_not_reenter_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let runner = {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            IntervalBatchRunner::new("gated", INTERVAL, move || {
                let calls = Arc::clone(&calls);
                let gate = Arc::clone(&gate);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    gate.notified().await;
                    Ok(3)
                }
            })
        };

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.tick().await })
        };

        while !runner.is_in_flight() {
            tokio::task::yield_now().await;
        }

        assert_eq!(runner.tick().await, 0, "overlapping tick must be skipped");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), 3);
        assert!(!runner.is_in_flight());

        // Once the first batch finished, ticking works again.
        gate.notify_one();
        assert_eq!(runner.tick().await, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_immediately_and_then_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = counting_runner(Arc::clone(&calls));

        runner.start();
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "immediate run at start");

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        runner.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = counting_runner(Arc::clone(&calls));

        runner.start();
        runner.start();
        runner.clone().start();
        tokio::time::sleep(INTERVAL / 2).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(runner.is_running());
        runner.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_batches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = counting_runner(Arc::clone(&calls));

        runner.start();
        tokio::time::sleep(INTERVAL * 2 + INTERVAL / 2).await;
        let before = calls.load(Ordering::SeqCst);
        assert!(before >= 1);

        runner.stop();
        tokio::time::sleep(INTERVAL * 20).await;

        assert_eq!(calls.load(Ordering::SeqCst), before);
        assert!(!runner.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn runner_can_be_restarted_after_stop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = counting_runner(Arc::clone(&calls));

        runner.start();
        tokio::time::sleep(INTERVAL / 2).await;
        runner.stop();
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        runner.start();
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        runner.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_batch_does_not_kill_timer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = {
            let calls = Arc::clone(&calls);
            IntervalBatchRunner::new("flaky", INTERVAL, move || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        anyhow::bail!("database unavailable");
                    }
                    Ok(2)
                }
            })
        };

        runner.start();
        tokio::time::sleep(INTERVAL / 2).await;
        let snapshot = runner.snapshot();
        assert_eq!(snapshot.consecutive_failures, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("database unavailable"));

        tokio::time::sleep(INTERVAL).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
        let snapshot = runner.snapshot();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.total_processed, 2);
        runner.stop();
    }

    #[tokio::test]
    async fn panicking_batch_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = {
            let calls = Arc::clone(&calls);
            IntervalBatchRunner::new("panicky", INTERVAL, move || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("boom");
                    }
                    Ok(5)
                }
            })
        };

        assert_eq!(runner.tick().await, 0);
        assert!(!runner.is_in_flight(), "guard must reset after a panic");
        assert_eq!(runner.snapshot().last_error.as_deref(), Some("batch panicked"));

        assert_eq!(runner.tick().await, 5);
    }

    #[tokio::test]
    async fn closure_panicking_before_its_future_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = {
            let calls = Arc::clone(&calls);
            IntervalBatchRunner::new("eager-panic", INTERVAL, move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("failed while building the batch");
                }
                async { Ok(7) }
            })
        };

        assert_eq!(runner.tick().await, 0);
        assert!(!runner.is_in_flight());
        assert_eq!(runner.snapshot().last_error.as_deref(), Some("batch panicked"));

        assert_eq!(runner.tick().await, 7);
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let runner = IntervalBatchRunner::new("zero", Duration::ZERO, || async { Ok(0) });
        assert_eq!(runner.interval(), MIN_INTERVAL);
        assert_eq!(runner.name(), "zero");
    }
}
