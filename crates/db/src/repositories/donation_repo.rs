//! Repository for the `donations` ledger.
//!
//! Processor-driven updates carry the processor's event time and are
//! ignored when the donation already reflects a newer event, so webhooks
//! arriving out of order cannot roll a donation back.

use benefactor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::donation::{CreateDonation, Donation, LedgerDonation};
use crate::models::status::PaymentStatus;

const COLUMNS: &str = "\
    id, contact_id, amount_cents, currency, donated_at, payment_method, \
    payment_status, provider, provider_reference, refunded_cents, \
    provider_event_at, failure_reason, created_at, updated_at";

/// Accept an update only when it is not older than the last one applied.
const EVENT_ORDER_GUARD: &str = "(provider_event_at IS NULL OR provider_event_at <= $2)";

pub struct DonationRepo;

impl DonationRepo {
    pub async fn create(pool: &PgPool, input: &CreateDonation) -> Result<Donation, sqlx::Error> {
        let query = format!(
            "INSERT INTO donations \
                 (contact_id, amount_cents, currency, donated_at, payment_method, \
                  payment_status, provider, provider_reference) \
             VALUES ($1, $2, LOWER($3), $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Donation>(&query)
            .bind(input.contact_id)
            .bind(input.amount_cents)
            .bind(&input.currency)
            .bind(input.donated_at)
            .bind(&input.payment_method)
            .bind(&input.payment_status)
            .bind(&input.provider)
            .bind(&input.provider_reference)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Donation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM donations WHERE id = $1");
        sqlx::query_as::<_, Donation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_provider_reference(
        pool: &PgPool,
        provider: &str,
        reference: &str,
    ) -> Result<Option<Donation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM donations WHERE provider = $1 AND provider_reference = $2"
        );
        sqlx::query_as::<_, Donation>(&query)
            .bind(provider)
            .bind(reference)
            .fetch_optional(pool)
            .await
    }

    /// Settled donations for `provider` in `[start, end)`, amounts net of
    /// refunds.
    pub async fn ledger_for_range(
        pool: &PgPool,
        provider: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<LedgerDonation>, sqlx::Error> {
        sqlx::query_as::<_, LedgerDonation>(
            "SELECT id, provider_reference, \
                    amount_cents - refunded_cents AS net_amount_cents, \
                    currency, donated_at \
             FROM donations \
             WHERE provider = $1 \
               AND payment_status IN ($2, $3) \
               AND donated_at >= $4 AND donated_at < $5 \
             ORDER BY donated_at ASC, id ASC",
        )
        .bind(provider)
        .bind(PaymentStatus::Succeeded.as_str())
        .bind(PaymentStatus::Refunded.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }

    /// Payment captured. Also links the processor reference when the
    /// donation was found through checkout metadata. Returns `false` when a
    /// newer event was already applied.
    pub async fn mark_succeeded(
        pool: &PgPool,
        id: DbId,
        event_at: Timestamp,
        amount_cents: i64,
        currency: &str,
        provider: &str,
        reference: &str,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE donations SET \
                 payment_status = $3, \
                 amount_cents = $4, \
                 currency = LOWER($5), \
                 provider = $6, \
                 provider_reference = COALESCE(provider_reference, $7), \
                 failure_reason = NULL, \
                 provider_event_at = $2 \
             WHERE id = $1 AND payment_status <> $8 AND {EVENT_ORDER_GUARD}"
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(event_at)
            .bind(PaymentStatus::Succeeded.as_str())
            .bind(amount_cents)
            .bind(currency)
            .bind(provider)
            .bind(reference)
            .bind(PaymentStatus::Refunded.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Payment attempt failed. A donation that already succeeded is left
    /// alone.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        event_at: Timestamp,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE donations SET \
                 payment_status = $3, \
                 failure_reason = $4, \
                 provider_event_at = $2 \
             WHERE id = $1 AND payment_status = $5 AND {EVENT_ORDER_GUARD}"
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(event_at)
            .bind(PaymentStatus::Failed.as_str())
            .bind(reason)
            .bind(PaymentStatus::Pending.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record the cumulative refunded amount. A full refund flips the
    /// status to `refunded`.
    pub async fn apply_refund(
        pool: &PgPool,
        id: DbId,
        event_at: Timestamp,
        refunded_cents: i64,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE donations SET \
                 refunded_cents = LEAST($3, amount_cents), \
                 payment_status = CASE WHEN $3 >= amount_cents THEN $4 ELSE payment_status END, \
                 provider_event_at = $2 \
             WHERE id = $1 AND payment_status IN ($5, $4) AND {EVENT_ORDER_GUARD}"
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(event_at)
            .bind(refunded_cents)
            .bind(PaymentStatus::Refunded.as_str())
            .bind(PaymentStatus::Succeeded.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
