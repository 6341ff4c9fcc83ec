//! Claim-and-mark batch driver.
//!
//! Every due-work poller follows the same cycle: release stale claims,
//! claim a bounded batch, process each item, and record a terminal outcome
//! per item. [`ClaimAndMark`] captures the table-specific parts of that
//! cycle; [`run_claimed_batch`] is the shared driver. An item whose
//! processing fails (or panics) is recorded as [`ItemOutcome::Failed`] and
//! the driver moves on to the next item.

use std::panic::AssertUnwindSafe;
use std::sync::OnceLock;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Terminal status written back to a claimed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Sent,
    Partial,
    Failed,
    Skipped,
}

impl ItemOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Per-recipient counts for fan-out deliveries (one reminder, many contacts).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTally {
    pub attempted: u32,
    pub succeeded: u32,
}

impl DeliveryTally {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.attempted += 1;
    }

    pub fn failed(&self) -> u32 {
        self.attempted - self.succeeded
    }

    /// Nothing attempted is `Skipped`; all delivered is `Sent`; nothing
    /// delivered is `Failed`; anything in between is `Partial`.
    pub fn outcome(&self) -> ItemOutcome {
        if self.attempted == 0 {
            ItemOutcome::Skipped
        } else if self.succeeded == self.attempted {
            ItemOutcome::Sent
        } else if self.succeeded == 0 {
            ItemOutcome::Failed
        } else {
            ItemOutcome::Partial
        }
    }
}

/// What processing decided for one claimed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    pub outcome: ItemOutcome,
    pub tally: DeliveryTally,
    pub detail: Option<String>,
}

impl Disposition {
    /// Classify from a tally. `last_error` is kept as the detail unless
    /// everything was delivered.
    pub fn from_tally(tally: DeliveryTally, last_error: Option<String>) -> Self {
        let outcome = tally.outcome();
        let detail = match outcome {
            ItemOutcome::Sent => None,
            ItemOutcome::Skipped => last_error.or_else(|| Some("no recipients".to_string())),
            _ => last_error,
        };
        Self {
            outcome,
            tally,
            detail,
        }
    }

    pub fn sent() -> Self {
        let mut tally = DeliveryTally::default();
        tally.record_success();
        Self {
            outcome: ItemOutcome::Sent,
            tally,
            detail: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: ItemOutcome::Skipped,
            tally: DeliveryTally::default(),
            detail: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: ItemOutcome::Failed,
            tally: DeliveryTally::default(),
            detail: Some(reason.into()),
        }
    }
}

/// A claimed row plus a slot for what `process` computed and `record`
/// needs to persist (a rendered row count, an HTTP response, a
/// reconciliation result). The slot is written at most once.
#[derive(Debug)]
pub struct WorkItem<T, R> {
    pub row: T,
    computed: OnceLock<R>,
}

impl<T, R> WorkItem<T, R> {
    pub fn new(row: T) -> Self {
        Self {
            row,
            computed: OnceLock::new(),
        }
    }

    /// Keep the first value; later calls are ignored.
    pub fn set_computed(&self, value: R) {
        let _ = self.computed.set(value);
    }

    pub fn computed(&self) -> Option<&R> {
        self.computed.get()
    }
}

/// Summary of one batch, logged by the driver and returned to the runner.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub released: u64,
    pub claimed: usize,
    pub sent: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Items whose outcome could not be written (claim lost or DB error).
    pub unrecorded: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Sent => self.sent += 1,
            ItemOutcome::Partial => self.partial += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// ClaimAndMark
// ---------------------------------------------------------------------------

/// Table-specific half of a due-work poller.
#[async_trait]
pub trait ClaimAndMark: Send + Sync {
    type Item: Send + Sync;

    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    fn item_id(&self, item: &Self::Item) -> DbId;

    /// Return rows whose claim lease expired to the claimable state.
    async fn release_stale(&self) -> anyhow::Result<u64> {
        Ok(0)
    }

    /// Atomically claim up to one batch of due rows.
    async fn claim(&self) -> anyhow::Result<Vec<Self::Item>>;

    /// Perform the side effects for one item.
    async fn process(&self, item: &Self::Item) -> anyhow::Result<Disposition>;

    /// Write the terminal outcome. Returns `false` when the claim was lost
    /// (another worker re-claimed the row after the lease expired).
    async fn record(&self, item: &Self::Item, disposition: &Disposition) -> anyhow::Result<bool>;
}

/// Run one claim/process/record cycle.
///
/// Only a failure to claim aborts the batch. Per-item processing errors
/// become `Failed` outcomes; recording errors are logged and counted.
pub async fn run_claimed_batch<W>(worker: &W) -> anyhow::Result<BatchReport>
where
    W: ClaimAndMark + ?Sized,
{
    let mut report = BatchReport::default();

    match worker.release_stale().await {
        Ok(released) => {
            if released > 0 {
                tracing::warn!(worker = worker.name(), released, "Released stale claims");
            }
            report.released = released;
        }
        Err(e) => {
            tracing::warn!(worker = worker.name(), error = %e, "Failed to release stale claims");
        }
    }

    let items = worker.claim().await?;
    report.claimed = items.len();

    for item in &items {
        let item_id = worker.item_id(item);

        let disposition = match AssertUnwindSafe(worker.process(item)).catch_unwind().await {
            Ok(Ok(disposition)) => disposition,
            Ok(Err(e)) => {
                tracing::warn!(
                    worker = worker.name(),
                    item_id,
                    error = %e,
                    "Item processing failed",
                );
                Disposition::failed(format!("{e:#}"))
            }
            Err(_) => {
                tracing::error!(worker = worker.name(), item_id, "Item processing panicked");
                Disposition::failed("processing panicked")
            }
        };

        match worker.record(item, &disposition).await {
            Ok(true) => {
                tracing::debug!(
                    worker = worker.name(),
                    item_id,
                    outcome = disposition.outcome.as_str(),
                    "Item recorded",
                );
                report.record(disposition.outcome);
            }
            Ok(false) => {
                tracing::warn!(
                    worker = worker.name(),
                    item_id,
                    "Claim lost before outcome was recorded",
                );
                report.unrecorded += 1;
            }
            Err(e) => {
                tracing::error!(
                    worker = worker.name(),
                    item_id,
                    error = %e,
                    "Failed to record item outcome",
                );
                report.unrecorded += 1;
            }
        }
    }

    if report.claimed > 0 {
        tracing::info!(
            worker = worker.name(),
            claimed = report.claimed,
            sent = report.sent,
            partial = report.partial,
            failed = report.failed,
            skipped = report.skipped,
            unrecorded = report.unrecorded,
            "Batch processed",
        );
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
