//! Repository for `scheduled_reports` and `scheduled_report_runs`.

use benefactor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::scheduled_report::{
    CreateScheduledReport, NewReportRun, ScheduledReport, ScheduledReportRun,
};
use crate::models::status::ScheduledReportStatus;

const COLUMNS: &str = "\
    id, name, report_type, format, frequency, recipients, next_run_at, is_active, \
    status, processing_started_at, last_run_at, last_status, last_error, \
    created_by, created_at, updated_at";

const RUN_COLUMNS: &str = "\
    id, scheduled_report_id, period_start, period_end, status, row_count, \
    recipients_attempted, recipients_succeeded, error, started_at, finished_at";

pub struct ScheduledReportRepo;

impl ScheduledReportRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateScheduledReport,
    ) -> Result<ScheduledReport, sqlx::Error> {
        let query = format!(
            "INSERT INTO scheduled_reports \
                 (name, report_type, format, frequency, recipients, next_run_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ScheduledReport>(&query)
            .bind(&input.name)
            .bind(&input.report_type)
            .bind(&input.format)
            .bind(&input.frequency)
            .bind(&input.recipients)
            .bind(input.next_run_at)
            .bind(input.created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ScheduledReport>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scheduled_reports WHERE id = $1");
        sqlx::query_as::<_, ScheduledReport>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_active(pool: &PgPool, id: DbId, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE scheduled_reports SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Make the schedule due immediately. The regular poller picks it up on
    /// its next tick.
    pub async fn run_now(pool: &PgPool, id: DbId) -> Result<Option<ScheduledReport>, sqlx::Error> {
        let query = format!(
            "UPDATE scheduled_reports SET next_run_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ScheduledReport>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn release_stale(pool: &PgPool, lease_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scheduled_reports \
             SET status = $1, processing_started_at = NULL \
             WHERE status = $2 \
               AND processing_started_at < NOW() - ($3 || ' seconds')::INTERVAL",
        )
        .bind(ScheduledReportStatus::Idle.as_str())
        .bind(ScheduledReportStatus::Processing.as_str())
        .bind(lease_secs.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim active schedules whose `next_run_at` has passed.
    pub async fn claim_due(pool: &PgPool, limit: i64) -> Result<Vec<ScheduledReport>, sqlx::Error> {
        let query = format!(
            "UPDATE scheduled_reports \
             SET status = $2, processing_started_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM scheduled_reports \
                 WHERE status = $3 \
                   AND processing_started_at IS NULL \
                   AND is_active \
                   AND next_run_at <= NOW() \
                 ORDER BY next_run_at ASC, id ASC \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let mut claimed = sqlx::query_as::<_, ScheduledReport>(&query)
            .bind(limit)
            .bind(ScheduledReportStatus::Processing.as_str())
            .bind(ScheduledReportStatus::Idle.as_str())
            .fetch_all(pool)
            .await?;
        claimed.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at).then(a.id.cmp(&b.id)));
        Ok(claimed)
    }

    /// Release the claim, advance `next_run_at` and append the run to the
    /// history, atomically. Returns `false` when the claim was lost.
    pub async fn complete_run(
        pool: &PgPool,
        id: DbId,
        claimed_at: Timestamp,
        next_run_at: Timestamp,
        run: &NewReportRun,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE scheduled_reports SET \
                 status = $3, \
                 processing_started_at = NULL, \
                 next_run_at = $4, \
                 last_run_at = NOW(), \
                 last_status = $5, \
                 last_error = $6 \
             WHERE id = $1 AND status = $7 AND processing_started_at = $2",
        )
        .bind(id)
        .bind(claimed_at)
        .bind(ScheduledReportStatus::Idle.as_str())
        .bind(next_run_at)
        .bind(&run.status)
        .bind(&run.error)
        .bind(ScheduledReportStatus::Processing.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO scheduled_report_runs \
                 (scheduled_report_id, period_start, period_end, status, row_count, \
                  recipients_attempted, recipients_succeeded, error, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(run.period_start)
        .bind(run.period_end)
        .bind(&run.status)
        .bind(run.row_count)
        .bind(run.recipients_attempted)
        .bind(run.recipients_succeeded)
        .bind(&run.error)
        .bind(run.started_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Run history, newest first.
    pub async fn list_runs(
        pool: &PgPool,
        report_id: DbId,
        limit: i64,
    ) -> Result<Vec<ScheduledReportRun>, sqlx::Error> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM scheduled_report_runs \
             WHERE scheduled_report_id = $1 \
             ORDER BY started_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, ScheduledReportRun>(&query)
            .bind(report_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
