//! Repository for reconciliation runs and discrepancies.

use benefactor_core::reconciliation::Discrepancy;
use benefactor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::reconciliation::{ReconciliationDiscrepancy, ReconciliationRun, RunTotals};
use crate::models::status::{DiscrepancyStatus, ReconciliationRunStatus, ReconciliationTrigger};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const RUN_COLUMNS: &str = "\
    id, provider, range_start, range_end, trigger, status, requested_by, \
    processing_started_at, completed_at, ledger_count, external_count, \
    matched_count, unmatched_local_count, unmatched_external_count, \
    amount_mismatch_count, date_mismatch_count, error, created_at, updated_at";

const DISCREPANCY_COLUMNS: &str = "\
    id, run_id, kind, status, donation_id, transaction_id, local_amount_cents, \
    external_amount_cents, currency, local_occurred_at, external_occurred_at, \
    detail, resolution_note, resolved_by, resolved_at, created_at, updated_at";

pub struct ReconciliationRepo;

impl ReconciliationRepo {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Queue a run requested by a user. A second open run for the same
    /// provider and range violates `uq_reconciliation_runs_open_range`.
    pub async fn create_run(
        pool: &PgPool,
        provider: &str,
        range_start: Timestamp,
        range_end: Timestamp,
        requested_by: Option<DbId>,
    ) -> Result<ReconciliationRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO reconciliation_runs \
                 (provider, range_start, range_end, trigger, requested_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, ReconciliationRun>(&query)
            .bind(provider)
            .bind(range_start)
            .bind(range_end)
            .bind(ReconciliationTrigger::Manual.as_str())
            .bind(requested_by)
            .fetch_one(pool)
            .await
    }

    /// Queue the automatic run for a range unless one was ever queued (or a
    /// manual one is still open). Returns `None` when nothing was inserted.
    pub async fn enqueue_scheduled(
        pool: &PgPool,
        provider: &str,
        range_start: Timestamp,
        range_end: Timestamp,
    ) -> Result<Option<ReconciliationRun>, sqlx::Error> {
        let query = format!(
            "INSERT INTO reconciliation_runs (provider, range_start, range_end, trigger) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, ReconciliationRun>(&query)
            .bind(provider)
            .bind(range_start)
            .bind(range_end)
            .bind(ReconciliationTrigger::Scheduled.as_str())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_run(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ReconciliationRun>, sqlx::Error> {
        let query = format!("SELECT {RUN_COLUMNS} FROM reconciliation_runs WHERE id = $1");
        sqlx::query_as::<_, ReconciliationRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Runs newest first.
    pub async fn list_runs(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReconciliationRun>, sqlx::Error> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM reconciliation_runs \
             ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ReconciliationRun>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn release_stale(pool: &PgPool, lease_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE reconciliation_runs \
             SET status = $1, processing_started_at = NULL \
             WHERE status = $2 \
               AND processing_started_at < NOW() - ($3 || ' seconds')::INTERVAL",
        )
        .bind(ReconciliationRunStatus::Pending.as_str())
        .bind(ReconciliationRunStatus::Processing.as_str())
        .bind(lease_secs.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim pending runs, oldest request first.
    pub async fn claim_pending(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<ReconciliationRun>, sqlx::Error> {
        let query = format!(
            "UPDATE reconciliation_runs \
             SET status = $2, processing_started_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM reconciliation_runs \
                 WHERE status = $3 AND processing_started_at IS NULL \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {RUN_COLUMNS}"
        );
        let mut claimed = sqlx::query_as::<_, ReconciliationRun>(&query)
            .bind(limit)
            .bind(ReconciliationRunStatus::Processing.as_str())
            .bind(ReconciliationRunStatus::Pending.as_str())
            .fetch_all(pool)
            .await?;
        claimed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(claimed)
    }

    /// Persist a finished run in one transaction: counts and status, the
    /// new discrepancies, and supersede open discrepancies of earlier runs
    /// whose range overlaps. Returns `false` (and writes nothing) when the
    /// claim was lost.
    pub async fn complete_run(
        pool: &PgPool,
        run_id: DbId,
        claimed_at: Timestamp,
        totals: &RunTotals,
        discrepancies: &[Discrepancy],
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let run: Option<(String, Timestamp, Timestamp)> = sqlx::query_as(
            "UPDATE reconciliation_runs SET \
                 status = $3, \
                 processing_started_at = NULL, \
                 completed_at = NOW(), \
                 ledger_count = $4, \
                 external_count = $5, \
                 matched_count = $6, \
                 unmatched_local_count = $7, \
                 unmatched_external_count = $8, \
                 amount_mismatch_count = $9, \
                 date_mismatch_count = $10, \
                 error = NULL \
             WHERE id = $1 AND status = $11 AND processing_started_at = $2 \
             RETURNING provider, range_start, range_end",
        )
        .bind(run_id)
        .bind(claimed_at)
        .bind(ReconciliationRunStatus::Completed.as_str())
        .bind(totals.ledger_count)
        .bind(totals.external_count)
        .bind(totals.summary.matched)
        .bind(totals.summary.unmatched_local)
        .bind(totals.summary.unmatched_external)
        .bind(totals.summary.amount_mismatch)
        .bind(totals.summary.date_mismatch)
        .bind(ReconciliationRunStatus::Processing.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((provider, range_start, range_end)) = run else {
            return Ok(false);
        };

        let superseded = sqlx::query(
            "UPDATE reconciliation_discrepancies d SET status = $5 \
             FROM reconciliation_runs r \
             WHERE d.run_id = r.id \
               AND r.id < $1 \
               AND r.provider = $2 \
               AND r.range_start < $4 \
               AND r.range_end > $3 \
               AND d.status = $6",
        )
        .bind(run_id)
        .bind(&provider)
        .bind(range_start)
        .bind(range_end)
        .bind(DiscrepancyStatus::Superseded.as_str())
        .bind(DiscrepancyStatus::Open.as_str())
        .execute(&mut *tx)
        .await?;

        for d in discrepancies {
            sqlx::query(
                "INSERT INTO reconciliation_discrepancies \
                     (run_id, kind, donation_id, transaction_id, local_amount_cents, \
                      external_amount_cents, currency, local_occurred_at, \
                      external_occurred_at, detail) \
                 VALUES ($1, $2, $3, $4, $5, $6, LOWER($7), $8, $9, $10)",
            )
            .bind(run_id)
            .bind(d.kind.as_str())
            .bind(d.donation_id)
            .bind(&d.transaction_id)
            .bind(d.local_amount_cents)
            .bind(d.external_amount_cents)
            .bind(&d.currency)
            .bind(d.local_occurred_at)
            .bind(d.external_occurred_at)
            .bind(&d.detail)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if superseded.rows_affected() > 0 {
            tracing::debug!(
                run_id,
                superseded = superseded.rows_affected(),
                "Superseded discrepancies from overlapping runs"
            );
        }
        Ok(true)
    }

    pub async fn fail_run(
        pool: &PgPool,
        run_id: DbId,
        claimed_at: Timestamp,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE reconciliation_runs SET \
                 status = $3, \
                 processing_started_at = NULL, \
                 completed_at = NOW(), \
                 error = $4 \
             WHERE id = $1 AND status = $5 AND processing_started_at = $2",
        )
        .bind(run_id)
        .bind(claimed_at)
        .bind(ReconciliationRunStatus::Failed.as_str())
        .bind(error)
        .bind(ReconciliationRunStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // -----------------------------------------------------------------------
    // Discrepancies
    // -----------------------------------------------------------------------

    pub async fn list_discrepancies(
        pool: &PgPool,
        run_id: DbId,
        status: Option<DiscrepancyStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReconciliationDiscrepancy>, sqlx::Error> {
        let query = format!(
            "SELECT {DISCREPANCY_COLUMNS} FROM reconciliation_discrepancies \
             WHERE run_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY id ASC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, ReconciliationDiscrepancy>(&query)
            .bind(run_id)
            .bind(status.map(DiscrepancyStatus::as_str))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn find_discrepancy(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ReconciliationDiscrepancy>, sqlx::Error> {
        let query =
            format!("SELECT {DISCREPANCY_COLUMNS} FROM reconciliation_discrepancies WHERE id = $1");
        sqlx::query_as::<_, ReconciliationDiscrepancy>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Close an open discrepancy as `resolved` or `ignored`. Returns `None`
    /// when it does not exist or is no longer open.
    pub async fn resolve_discrepancy(
        pool: &PgPool,
        id: DbId,
        status: DiscrepancyStatus,
        note: Option<&str>,
        resolved_by: DbId,
    ) -> Result<Option<ReconciliationDiscrepancy>, sqlx::Error> {
        let query = format!(
            "UPDATE reconciliation_discrepancies SET \
                 status = $2, \
                 resolution_note = $3, \
                 resolved_by = $4, \
                 resolved_at = NOW() \
             WHERE id = $1 AND status = $5 \
             RETURNING {DISCREPANCY_COLUMNS}"
        );
        sqlx::query_as::<_, ReconciliationDiscrepancy>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(note)
            .bind(resolved_by)
            .bind(DiscrepancyStatus::Open.as_str())
            .fetch_optional(pool)
            .await
    }
}
