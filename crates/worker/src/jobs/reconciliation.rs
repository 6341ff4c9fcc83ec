//! Reconciliation runs, plus the daily enqueue of the previous UTC day.

use std::sync::Arc;

use async_trait::async_trait;
use benefactor_core::batch::{ClaimAndMark, Disposition, ItemOutcome, WorkItem};
use benefactor_core::reconciliation::{
    reconcile, DateRange, Discrepancy, LedgerEntry, ProcessorTransaction, ReconciliationPolicy,
};
use benefactor_core::types::{DbId, Timestamp};
use benefactor_db::models::reconciliation::{ReconciliationRun, RunTotals};
use benefactor_db::repositories::{DonationRepo, ReconciliationRepo};
use benefactor_payments::PaymentProvider;
use chrono::{Duration, NaiveTime};
use sqlx::PgPool;

/// A claimed run plus the totals and findings `process` computed.
pub type RunItem = WorkItem<ReconciliationRun, (RunTotals, Vec<Discrepancy>)>;

pub struct ReconciliationJob {
    pool: PgPool,
    provider: Option<Arc<dyn PaymentProvider>>,
    policy: ReconciliationPolicy,
    batch_size: i64,
    lease_secs: i64,
}

impl ReconciliationJob {
    pub fn new(
        pool: PgPool,
        provider: Option<Arc<dyn PaymentProvider>>,
        policy: ReconciliationPolicy,
        batch_size: i64,
        lease_secs: i64,
    ) -> Self {
        Self {
            pool,
            provider,
            policy,
            batch_size,
            lease_secs,
        }
    }
}

fn clamp_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Classify and count. Only transactions inside the run's range count as
/// external rows; the rest were fetched for the date tolerance.
pub fn evaluate(
    range: &DateRange,
    ledger: &[LedgerEntry],
    transactions: &[ProcessorTransaction],
    policy: &ReconciliationPolicy,
) -> (RunTotals, Vec<Discrepancy>) {
    let outcome = reconcile(range, ledger, transactions, policy);
    let totals = RunTotals {
        ledger_count: clamp_count(ledger.len()),
        external_count: clamp_count(
            transactions
                .iter()
                .filter(|t| range.contains(t.occurred_at))
                .count(),
        ),
        summary: outcome.summary(),
    };
    (totals, outcome.discrepancies)
}

#[async_trait]
impl ClaimAndMark for ReconciliationJob {
    type Item = RunItem;

    fn name(&self) -> &'static str {
        "reconciliation"
    }

    fn item_id(&self, item: &RunItem) -> DbId {
        item.row.id
    }

    async fn release_stale(&self) -> anyhow::Result<u64> {
        Ok(ReconciliationRepo::release_stale(&self.pool, self.lease_secs).await?)
    }

    async fn claim(&self) -> anyhow::Result<Vec<RunItem>> {
        let rows = ReconciliationRepo::claim_pending(&self.pool, self.batch_size).await?;
        Ok(rows.into_iter().map(WorkItem::new).collect())
    }

    async fn process(&self, item: &RunItem) -> anyhow::Result<Disposition> {
        let run = &item.row;
        let Some(provider) = self.provider.as_ref() else {
            return Ok(Disposition::failed("payment provider not configured"));
        };
        if provider.name() != run.provider {
            return Ok(Disposition::failed(format!(
                "no client for provider '{}'",
                run.provider
            )));
        }
        let Some(range) = DateRange::new(run.range_start, run.range_end) else {
            return Ok(Disposition::failed("empty date range"));
        };

        let ledger: Vec<LedgerEntry> =
            DonationRepo::ledger_for_range(&self.pool, &run.provider, range.start, range.end)
                .await?
                .into_iter()
                .map(LedgerEntry::from)
                .collect();
        let transactions = provider
            .list_transactions(&range.padded(self.policy.date_tolerance))
            .await?;

        let (totals, discrepancies) = evaluate(&range, &ledger, &transactions, &self.policy);
        tracing::info!(
            run_id = run.id,
            ledger = totals.ledger_count,
            external = totals.external_count,
            matched = totals.summary.matched,
            discrepancies = discrepancies.len(),
            "Reconciliation evaluated",
        );
        item.set_computed((totals, discrepancies));
        Ok(Disposition::sent())
    }

    async fn record(&self, item: &RunItem, disposition: &Disposition) -> anyhow::Result<bool> {
        let run = &item.row;
        let Some(claimed_at) = run.processing_started_at else {
            return Ok(false);
        };

        match (disposition.outcome, item.computed()) {
            (ItemOutcome::Sent, Some((totals, discrepancies))) => {
                let recorded = ReconciliationRepo::complete_run(
                    &self.pool,
                    run.id,
                    claimed_at,
                    totals,
                    discrepancies,
                )
                .await?;
                Ok(recorded)
            }
            _ => {
                let error = disposition.detail.as_deref().unwrap_or("reconciliation failed");
                Ok(ReconciliationRepo::fail_run(&self.pool, run.id, claimed_at, error).await?)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Daily enqueue
// ---------------------------------------------------------------------------

/// The UTC calendar day before the one containing `now`.
pub fn previous_utc_day(now: Timestamp) -> DateRange {
    let end = now.date_naive().and_time(NaiveTime::default()).and_utc();
    DateRange {
        start: end - Duration::days(1),
        end,
    }
}

/// Enqueues yesterday's run once per provider. Safe to call repeatedly and
/// from several workers.
pub struct ReconciliationScheduler {
    pool: PgPool,
    provider: &'static str,
}

impl ReconciliationScheduler {
    pub fn new(pool: PgPool, provider: &'static str) -> Self {
        Self { pool, provider }
    }

    /// Returns the new run, or `None` when that day is already queued.
    pub async fn enqueue_previous_day(
        &self,
        now: Timestamp,
    ) -> Result<Option<ReconciliationRun>, sqlx::Error> {
        let range = previous_utc_day(now);
        let run =
            ReconciliationRepo::enqueue_scheduled(&self.pool, self.provider, range.start, range.end)
                .await?;
        if let Some(run) = &run {
            tracing::info!(
                run_id = run.id,
                provider = self.provider,
                range_start = %range.start,
                "Enqueued daily reconciliation",
            );
        }
        Ok(run)
    }
}
