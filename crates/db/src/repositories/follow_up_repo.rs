//! Repository for follow-up reminders.

use benefactor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::follow_up::{ClaimedFollowUp, CreateFollowUp, FollowUp};
use crate::models::status::FollowUpReminderStatus;

const COLUMNS: &str = "\
    id, contact_id, assigned_to, subject, notes, due_at, reminder_lead_minutes, \
    status, reminder_status, processing_started_at, reminder_sent_at, \
    reminder_error, completed_at, created_at, updated_at";

/// Default lead time when a follow-up does not set one.
pub const DEFAULT_LEAD_MINUTES: i32 = 60;

pub struct FollowUpRepo;

impl FollowUpRepo {
    pub async fn create(pool: &PgPool, input: &CreateFollowUp) -> Result<FollowUp, sqlx::Error> {
        let query = format!(
            "INSERT INTO follow_ups \
                 (contact_id, assigned_to, subject, notes, due_at, reminder_lead_minutes) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FollowUp>(&query)
            .bind(input.contact_id)
            .bind(input.assigned_to)
            .bind(&input.subject)
            .bind(&input.notes)
            .bind(input.due_at)
            .bind(input.reminder_lead_minutes.unwrap_or(DEFAULT_LEAD_MINUTES))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<FollowUp>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM follow_ups WHERE id = $1");
        sqlx::query_as::<_, FollowUp>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark the task itself done. Its pending reminder will be skipped.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE follow_ups SET status = 'completed', completed_at = NOW() \
             WHERE id = $1 AND status = 'open'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn release_stale(pool: &PgPool, lease_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE follow_ups \
             SET reminder_status = $1, processing_started_at = NULL \
             WHERE reminder_status = $2 \
               AND processing_started_at < NOW() - ($3 || ' seconds')::INTERVAL",
        )
        .bind(FollowUpReminderStatus::Pending.as_str())
        .bind(FollowUpReminderStatus::Processing.as_str())
        .bind(lease_secs.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim follow-ups whose reminder time (`due_at` minus the lead) has
    /// passed.
    pub async fn claim_due(pool: &PgPool, limit: i64) -> Result<Vec<ClaimedFollowUp>, sqlx::Error> {
        sqlx::query_as::<_, ClaimedFollowUp>(
            "WITH claimed AS ( \
                 UPDATE follow_ups \
                 SET reminder_status = $2, processing_started_at = NOW() \
                 WHERE id IN ( \
                     SELECT id FROM follow_ups \
                     WHERE reminder_status = $3 \
                       AND processing_started_at IS NULL \
                       AND due_at - make_interval(mins => reminder_lead_minutes) <= NOW() \
                     ORDER BY due_at ASC, id ASC \
                     LIMIT $1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING id, contact_id, assigned_to, subject, notes, due_at, status, \
                           processing_started_at \
             ) \
             SELECT c.id, c.subject, c.notes, c.due_at, c.status, c.processing_started_at, \
                    u.email AS assignee_email, \
                    NULLIF(TRIM(u.first_name || ' ' || u.last_name), '') AS assignee_name, \
                    NULLIF(TRIM(ct.first_name || ' ' || ct.last_name), '') AS contact_name \
             FROM claimed c \
             LEFT JOIN users u ON u.id = c.assigned_to AND u.is_active \
             LEFT JOIN contacts ct ON ct.id = c.contact_id \
             ORDER BY c.due_at ASC, c.id ASC",
        )
        .bind(limit)
        .bind(FollowUpReminderStatus::Processing.as_str())
        .bind(FollowUpReminderStatus::Pending.as_str())
        .fetch_all(pool)
        .await
    }

    pub async fn record_outcome(
        pool: &PgPool,
        id: DbId,
        claimed_at: Timestamp,
        status: FollowUpReminderStatus,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE follow_ups SET \
                 reminder_status = $3, \
                 processing_started_at = NULL, \
                 reminder_sent_at = CASE WHEN $3 = 'sent' THEN NOW() ELSE reminder_sent_at END, \
                 reminder_error = $4 \
             WHERE id = $1 AND reminder_status = $5 AND processing_started_at = $2",
        )
        .bind(id)
        .bind(claimed_at)
        .bind(status.as_str())
        .bind(error)
        .bind(FollowUpReminderStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
