//! Read-only queries behind the built-in scheduled reports. Every query
//! covers the half-open window `[start, end)`.

use benefactor_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::report_data::{
    DonationDayTotal, DonationDetailRow, EventAttendanceRow, NewContactRow,
};

pub struct ReportDataRepo;

impl ReportDataRepo {
    /// Settled donations grouped per UTC day and currency, net of refunds.
    pub async fn donation_day_totals(
        pool: &PgPool,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<DonationDayTotal>, sqlx::Error> {
        sqlx::query_as::<_, DonationDayTotal>(
            "SELECT (donated_at AT TIME ZONE 'UTC')::DATE AS day, \
                    currency, \
                    COUNT(*) AS donation_count, \
                    SUM(amount_cents - refunded_cents)::BIGINT AS net_cents \
             FROM donations \
             WHERE payment_status IN ('succeeded', 'refunded') \
               AND donated_at >= $1 AND donated_at < $2 \
             GROUP BY 1, 2 \
             ORDER BY 1, 2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }

    pub async fn donation_details(
        pool: &PgPool,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<DonationDetailRow>, sqlx::Error> {
        sqlx::query_as::<_, DonationDetailRow>(
            "SELECT d.id, d.donated_at, \
                    NULLIF(TRIM(c.first_name || ' ' || c.last_name), '') AS donor_name, \
                    d.amount_cents, d.refunded_cents, d.currency, d.payment_method, \
                    d.payment_status, d.provider_reference \
             FROM donations d \
             LEFT JOIN contacts c ON c.id = d.contact_id \
             WHERE d.donated_at >= $1 AND d.donated_at < $2 \
             ORDER BY d.donated_at ASC, d.id ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }

    pub async fn new_contacts(
        pool: &PgPool,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<NewContactRow>, sqlx::Error> {
        sqlx::query_as::<_, NewContactRow>(
            "SELECT id, first_name, last_name, email, phone, created_at \
             FROM contacts \
             WHERE created_at >= $1 AND created_at < $2 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }

    /// Registration counts per event starting in the window.
    pub async fn event_attendance(
        pool: &PgPool,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<EventAttendanceRow>, sqlx::Error> {
        sqlx::query_as::<_, EventAttendanceRow>(
            "SELECT e.id AS event_id, e.name, e.starts_at, e.status, \
                    COUNT(r.id) FILTER ( \
                        WHERE r.status IN ('registered', 'attended', 'no_show') \
                    ) AS registered, \
                    COUNT(r.id) FILTER (WHERE r.status = 'attended') AS attended, \
                    COUNT(r.id) FILTER (WHERE r.status = 'no_show') AS no_show, \
                    COUNT(r.id) FILTER (WHERE r.status = 'cancelled') AS cancelled \
             FROM events e \
             LEFT JOIN event_registrations r ON r.event_id = e.id \
             WHERE e.starts_at >= $1 AND e.starts_at < $2 \
             GROUP BY e.id \
             ORDER BY e.starts_at ASC, e.id ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
    }
}
