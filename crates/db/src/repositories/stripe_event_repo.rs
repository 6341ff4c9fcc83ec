//! Idempotency log for Stripe webhook events.
//!
//! `begin` is the only entry point: it inserts the event id, or re-opens a
//! row whose earlier handling failed or whose `processing` lease expired.
//! Any other existing row (processed, rejected, or still in flight) makes
//! the delivery a duplicate.

use benefactor_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::status::StripeEventStatus;
use crate::models::stripe_event::StripeWebhookEvent;

const COLUMNS: &str = "\
    id, event_id, event_type, livemode, event_created_at, status, attempts, \
    error, received_at, processed_at, updated_at";

pub struct StripeEventRepo;

impl StripeEventRepo {
    /// Claim an event for processing. Returns `false` for duplicates.
    ///
    /// A row left in `processing` for longer than `lease_secs` (the handler
    /// timed out or the process died) is claimed again.
    pub async fn begin(
        pool: &PgPool,
        event_id: &str,
        event_type: &str,
        livemode: bool,
        event_created_at: Timestamp,
        lease_secs: i64,
    ) -> Result<bool, sqlx::Error> {
        let claimed: Option<i64> = sqlx::query_scalar(
            "INSERT INTO stripe_webhook_events \
                 (event_id, event_type, livemode, event_created_at, status) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT uq_stripe_webhook_events_event_id DO UPDATE SET \
                 status = EXCLUDED.status, \
                 attempts = stripe_webhook_events.attempts + 1, \
                 error = NULL \
             WHERE stripe_webhook_events.status = $6 \
                OR (stripe_webhook_events.status = $5 \
                    AND stripe_webhook_events.updated_at < NOW() - ($7 || ' seconds')::INTERVAL) \
             RETURNING id",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(livemode)
        .bind(event_created_at)
        .bind(StripeEventStatus::Processing.as_str())
        .bind(StripeEventStatus::Failed.as_str())
        .bind(lease_secs.to_string())
        .fetch_optional(pool)
        .await?;
        Ok(claimed.is_some())
    }

    pub async fn mark_processed(pool: &PgPool, event_id: &str) -> Result<(), sqlx::Error> {
        Self::finish(pool, event_id, StripeEventStatus::Processed, None).await
    }

    pub async fn mark_rejected(
        pool: &PgPool,
        event_id: &str,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        Self::finish(pool, event_id, StripeEventStatus::Rejected, Some(reason)).await
    }

    /// Failed events are re-opened by the next delivery of the same id.
    pub async fn mark_failed(
        pool: &PgPool,
        event_id: &str,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        Self::finish(pool, event_id, StripeEventStatus::Failed, Some(error)).await
    }

    pub async fn find_by_event_id(
        pool: &PgPool,
        event_id: &str,
    ) -> Result<Option<StripeWebhookEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stripe_webhook_events WHERE event_id = $1");
        sqlx::query_as::<_, StripeWebhookEvent>(&query)
            .bind(event_id)
            .fetch_optional(pool)
            .await
    }

    async fn finish(
        pool: &PgPool,
        event_id: &str,
        status: StripeEventStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE stripe_webhook_events \
             SET status = $2, error = $3, processed_at = NOW() \
             WHERE event_id = $1",
        )
        .bind(event_id)
        .bind(status.as_str())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
