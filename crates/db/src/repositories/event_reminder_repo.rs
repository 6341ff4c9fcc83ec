//! Repository for the `event_reminders` queue.

use benefactor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::event_reminder::{
    ClaimedEventReminder, CreateEventReminder, EventReminder, ReminderRecipient,
};
use crate::models::status::EventReminderStatus;

const COLUMNS: &str = "\
    id, event_id, channel, send_at, custom_message, status, \
    processing_started_at, sent_at, attempted_count, succeeded_count, \
    last_error, created_by, created_at, updated_at";

pub struct EventReminderRepo;

impl EventReminderRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateEventReminder,
    ) -> Result<EventReminder, sqlx::Error> {
        let query = format!(
            "INSERT INTO event_reminders (event_id, channel, send_at, custom_message, created_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EventReminder>(&query)
            .bind(input.event_id)
            .bind(&input.channel)
            .bind(input.send_at)
            .bind(&input.custom_message)
            .bind(input.created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<EventReminder>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM event_reminders WHERE id = $1");
        sqlx::query_as::<_, EventReminder>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Return reminders whose claim is older than `lease_secs` to `pending`.
    pub async fn release_stale(pool: &PgPool, lease_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE event_reminders \
             SET status = $1, processing_started_at = NULL \
             WHERE status = $2 \
               AND processing_started_at < NOW() - ($3 || ' seconds')::INTERVAL",
        )
        .bind(EventReminderStatus::Pending.as_str())
        .bind(EventReminderStatus::Processing.as_str())
        .bind(lease_secs.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Atomically claim up to `limit` due reminders, oldest first.
    ///
    /// Rows locked by a concurrent claimer are skipped, so two pollers
    /// never receive the same reminder.
    pub async fn claim_due(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<ClaimedEventReminder>, sqlx::Error> {
        sqlx::query_as::<_, ClaimedEventReminder>(
            "WITH claimed AS ( \
                 UPDATE event_reminders \
                 SET status = $2, processing_started_at = NOW() \
                 WHERE id IN ( \
                     SELECT id FROM event_reminders \
                     WHERE status = $3 \
                       AND processing_started_at IS NULL \
                       AND send_at <= NOW() \
                     ORDER BY send_at ASC, id ASC \
                     LIMIT $1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING id, event_id, channel, custom_message, processing_started_at, send_at \
             ) \
             SELECT c.id, c.event_id, c.channel, c.custom_message, c.processing_started_at, \
                    e.name AS event_name, e.starts_at AS event_starts_at, \
                    e.location AS event_location, e.status AS event_status \
             FROM claimed c \
             JOIN events e ON e.id = c.event_id \
             ORDER BY c.send_at ASC, c.id ASC",
        )
        .bind(limit)
        .bind(EventReminderStatus::Processing.as_str())
        .bind(EventReminderStatus::Pending.as_str())
        .fetch_all(pool)
        .await
    }

    /// Contacts registered for the event, in contact id order.
    pub async fn list_recipients(
        pool: &PgPool,
        event_id: DbId,
    ) -> Result<Vec<ReminderRecipient>, sqlx::Error> {
        sqlx::query_as::<_, ReminderRecipient>(
            "SELECT c.id AS contact_id, c.first_name, c.last_name, c.email, c.phone, \
                    c.email_opt_out, c.sms_opt_in \
             FROM event_registrations r \
             JOIN contacts c ON c.id = r.contact_id \
             WHERE r.event_id = $1 AND r.status = 'registered' \
             ORDER BY c.id ASC",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    /// Write the terminal outcome. Returns `false` when the claim token no
    /// longer matches.
    pub async fn record_outcome(
        pool: &PgPool,
        id: DbId,
        claimed_at: Timestamp,
        status: EventReminderStatus,
        attempted: i32,
        succeeded: i32,
        last_error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE event_reminders SET \
                 status = $3, \
                 processing_started_at = NULL, \
                 sent_at = CASE WHEN $4 > 0 THEN NOW() ELSE sent_at END, \
                 attempted_count = $5, \
                 succeeded_count = $4, \
                 last_error = $6 \
             WHERE id = $1 AND status = $7 AND processing_started_at = $2",
        )
        .bind(id)
        .bind(claimed_at)
        .bind(status.as_str())
        .bind(succeeded)
        .bind(attempted)
        .bind(last_error)
        .bind(EventReminderStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
