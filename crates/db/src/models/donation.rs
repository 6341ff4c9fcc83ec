//! Donation ledger rows.

use benefactor_core::reconciliation::LedgerEntry;
use benefactor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `donations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Donation {
    pub id: DbId,
    pub contact_id: Option<DbId>,
    pub amount_cents: i64,
    pub currency: String,
    pub donated_at: Timestamp,
    pub payment_method: String,
    pub payment_status: String,
    pub provider: Option<String>,
    pub provider_reference: Option<String>,
    pub refunded_cents: i64,
    pub provider_event_at: Option<Timestamp>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for recording a donation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDonation {
    pub contact_id: Option<DbId>,
    pub amount_cents: i64,
    pub currency: String,
    pub donated_at: Timestamp,
    pub payment_method: String,
    pub payment_status: String,
    pub provider: Option<String>,
    pub provider_reference: Option<String>,
}

/// A settled donation as the reconciliation engine sees it.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerDonation {
    pub id: DbId,
    pub provider_reference: Option<String>,
    pub net_amount_cents: i64,
    pub currency: String,
    pub donated_at: Timestamp,
}

impl From<LedgerDonation> for LedgerEntry {
    fn from(row: LedgerDonation) -> Self {
        Self {
            donation_id: row.id,
            processor_ref: row.provider_reference,
            amount_cents: row.net_amount_cents,
            currency: row.currency,
            occurred_at: row.donated_at,
        }
    }
}
