//! Repository for `webhook_endpoints` and the `webhook_deliveries` queue.

use benefactor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::status::WebhookDeliveryStatus;
use crate::models::webhook::{
    AttemptRecord, ClaimedDelivery, CreateWebhookEndpoint, WebhookDelivery, WebhookEndpoint,
};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const ENDPOINT_COLUMNS: &str = "\
    id, name, url, secret, event_types, is_enabled, last_triggered_at, \
    failure_count, created_by, created_at, updated_at";

const DELIVERY_COLUMNS: &str = "\
    id, endpoint_id, event_type, payload, status, attempt_count, max_attempts, \
    next_retry_at, processing_started_at, response_status_code, response_body, \
    last_error, delivered_at, created_at, updated_at";

pub struct WebhookRepo;

impl WebhookRepo {
    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    pub async fn create_endpoint(
        pool: &PgPool,
        input: &CreateWebhookEndpoint,
    ) -> Result<WebhookEndpoint, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_endpoints (name, url, secret, event_types, created_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ENDPOINT_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookEndpoint>(&query)
            .bind(&input.name)
            .bind(&input.url)
            .bind(&input.secret)
            .bind(serde_json::json!(input.event_types))
            .bind(input.created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_endpoint(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WebhookEndpoint>, sqlx::Error> {
        let query = format!("SELECT {ENDPOINT_COLUMNS} FROM webhook_endpoints WHERE id = $1");
        sqlx::query_as::<_, WebhookEndpoint>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_endpoint_enabled(
        pool: &PgPool,
        id: DbId,
        is_enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE webhook_endpoints SET is_enabled = $2 WHERE id = $1")
            .bind(id)
            .bind(is_enabled)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    // -----------------------------------------------------------------------
    // Deliveries
    // -----------------------------------------------------------------------

    /// Queue a delivery for immediate pickup.
    pub async fn enqueue_delivery(
        pool: &PgPool,
        endpoint_id: DbId,
        event_type: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<WebhookDelivery, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_deliveries (endpoint_id, event_type, payload, max_attempts) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(endpoint_id)
            .bind(event_type)
            .bind(payload)
            .bind(max_attempts)
            .fetch_one(pool)
            .await
    }

    pub async fn find_delivery(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1");
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delivery history for an endpoint, newest first.
    pub async fn list_deliveries(
        pool: &PgPool,
        endpoint_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE endpoint_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(endpoint_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Put a delivery back at the front of the queue with a fresh attempt
    /// budget. Returns `None` when the delivery does not exist or is being
    /// processed right now.
    pub async fn replay_delivery(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_deliveries SET \
                 status = $2, \
                 attempt_count = 0, \
                 next_retry_at = NOW(), \
                 processing_started_at = NULL, \
                 response_status_code = NULL, \
                 response_body = NULL, \
                 last_error = NULL, \
                 delivered_at = NULL \
             WHERE id = $1 AND status <> $3 \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(id)
            .bind(WebhookDeliveryStatus::Pending.as_str())
            .bind(WebhookDeliveryStatus::Processing.as_str())
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Claim / record
    // -----------------------------------------------------------------------

    /// Expired claims go back to `pending` (never attempted) or `retrying`.
    pub async fn release_stale(pool: &PgPool, lease_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE webhook_deliveries SET \
                 status = CASE WHEN attempt_count = 0 THEN $1 ELSE $2 END, \
                 processing_started_at = NULL \
             WHERE status = $3 \
               AND processing_started_at < NOW() - ($4 || ' seconds')::INTERVAL",
        )
        .bind(WebhookDeliveryStatus::Pending.as_str())
        .bind(WebhookDeliveryStatus::Retrying.as_str())
        .bind(WebhookDeliveryStatus::Processing.as_str())
        .bind(lease_secs.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim deliveries that are pending or due for a retry.
    pub async fn claim_due(pool: &PgPool, limit: i64) -> Result<Vec<ClaimedDelivery>, sqlx::Error> {
        sqlx::query_as::<_, ClaimedDelivery>(
            "WITH claimed AS ( \
                 UPDATE webhook_deliveries \
                 SET status = $2, processing_started_at = NOW() \
                 WHERE id IN ( \
                     SELECT id FROM webhook_deliveries \
                     WHERE status IN ($3, $4) \
                       AND processing_started_at IS NULL \
                       AND next_retry_at <= NOW() \
                       AND attempt_count < max_attempts \
                     ORDER BY next_retry_at ASC, id ASC \
                     LIMIT $1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING id, endpoint_id, event_type, payload, attempt_count, max_attempts, \
                           processing_started_at, next_retry_at \
             ) \
             SELECT c.id, c.endpoint_id, c.event_type, c.payload, c.attempt_count, \
                    c.max_attempts, c.processing_started_at, \
                    e.url AS endpoint_url, e.secret AS endpoint_secret, \
                    e.is_enabled AS endpoint_enabled \
             FROM claimed c \
             LEFT JOIN webhook_endpoints e ON e.id = c.endpoint_id \
             ORDER BY c.next_retry_at ASC, c.id ASC",
        )
        .bind(limit)
        .bind(WebhookDeliveryStatus::Processing.as_str())
        .bind(WebhookDeliveryStatus::Pending.as_str())
        .bind(WebhookDeliveryStatus::Retrying.as_str())
        .fetch_all(pool)
        .await
    }

    /// Record a 2xx. Resets the endpoint's failure streak.
    pub async fn mark_delivered(
        pool: &PgPool,
        id: DbId,
        claimed_at: Timestamp,
        attempt: &AttemptRecord,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let endpoint_id: Option<Option<DbId>> = sqlx::query_scalar(
            "UPDATE webhook_deliveries SET \
                 status = $3, \
                 processing_started_at = NULL, \
                 attempt_count = $4, \
                 response_status_code = $5, \
                 response_body = $6, \
                 last_error = NULL, \
                 delivered_at = NOW() \
             WHERE id = $1 AND status = $7 AND processing_started_at = $2 \
             RETURNING endpoint_id",
        )
        .bind(id)
        .bind(claimed_at)
        .bind(WebhookDeliveryStatus::Delivered.as_str())
        .bind(attempt.attempt_count)
        .bind(attempt.response_status_code)
        .bind(&attempt.response_body)
        .bind(WebhookDeliveryStatus::Processing.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(endpoint_id) = endpoint_id else {
            return Ok(false);
        };
        if let Some(endpoint_id) = endpoint_id {
            sqlx::query(
                "UPDATE webhook_endpoints \
                 SET last_triggered_at = NOW(), failure_count = 0 \
                 WHERE id = $1",
            )
            .bind(endpoint_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Release the claim and schedule the next attempt `delay_secs` out.
    pub async fn schedule_retry(
        pool: &PgPool,
        id: DbId,
        claimed_at: Timestamp,
        attempt: &AttemptRecord,
        delay_secs: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let endpoint_id: Option<Option<DbId>> = sqlx::query_scalar(
            "UPDATE webhook_deliveries SET \
                 status = $3, \
                 processing_started_at = NULL, \
                 attempt_count = $4, \
                 response_status_code = $5, \
                 response_body = $6, \
                 last_error = $7, \
                 next_retry_at = NOW() + ($8 || ' seconds')::INTERVAL \
             WHERE id = $1 AND status = $9 AND processing_started_at = $2 \
             RETURNING endpoint_id",
        )
        .bind(id)
        .bind(claimed_at)
        .bind(WebhookDeliveryStatus::Retrying.as_str())
        .bind(attempt.attempt_count)
        .bind(attempt.response_status_code)
        .bind(&attempt.response_body)
        .bind(&attempt.error)
        .bind(delay_secs.to_string())
        .bind(WebhookDeliveryStatus::Processing.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(endpoint_id) = endpoint_id else {
            return Ok(false);
        };
        if let Some(endpoint_id) = endpoint_id {
            Self::touch_endpoint(&mut tx, endpoint_id).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Terminal failure. Bumps the endpoint's failure count.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        claimed_at: Timestamp,
        attempt: &AttemptRecord,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let endpoint_id: Option<Option<DbId>> = sqlx::query_scalar(
            "UPDATE webhook_deliveries SET \
                 status = $3, \
                 processing_started_at = NULL, \
                 attempt_count = $4, \
                 response_status_code = $5, \
                 response_body = $6, \
                 last_error = $7 \
             WHERE id = $1 AND status = $8 AND processing_started_at = $2 \
             RETURNING endpoint_id",
        )
        .bind(id)
        .bind(claimed_at)
        .bind(WebhookDeliveryStatus::Failed.as_str())
        .bind(attempt.attempt_count)
        .bind(attempt.response_status_code)
        .bind(&attempt.response_body)
        .bind(&attempt.error)
        .bind(WebhookDeliveryStatus::Processing.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(endpoint_id) = endpoint_id else {
            return Ok(false);
        };
        if let Some(endpoint_id) = endpoint_id {
            Self::touch_endpoint(&mut tx, endpoint_id).await?;
            sqlx::query(
                "UPDATE webhook_endpoints SET failure_count = failure_count + 1 WHERE id = $1",
            )
            .bind(endpoint_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn touch_endpoint(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        endpoint_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhook_endpoints SET last_triggered_at = NOW() WHERE id = $1")
            .bind(endpoint_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
