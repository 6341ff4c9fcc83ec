//! Rows feeding the built-in scheduled reports.

use benefactor_core::types::{DbId, Timestamp};
use chrono::NaiveDate;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct DonationDayTotal {
    pub day: NaiveDate,
    pub currency: String,
    pub donation_count: i64,
    pub net_cents: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct DonationDetailRow {
    pub id: DbId,
    pub donated_at: Timestamp,
    pub donor_name: Option<String>,
    pub amount_cents: i64,
    pub refunded_cents: i64,
    pub currency: String,
    pub payment_method: String,
    pub payment_status: String,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NewContactRow {
    pub id: DbId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, FromRow)]
pub struct EventAttendanceRow {
    pub event_id: DbId,
    pub name: String,
    pub starts_at: Timestamp,
    pub status: String,
    pub registered: i64,
    pub attended: i64,
    pub no_show: i64,
    pub cancelled: i64,
}
