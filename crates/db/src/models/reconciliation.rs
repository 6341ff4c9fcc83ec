//! Reconciliation runs and discrepancies.

use benefactor_core::reconciliation::ReconciliationSummary;
use benefactor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `reconciliation_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReconciliationRun {
    pub id: DbId,
    pub provider: String,
    pub range_start: Timestamp,
    pub range_end: Timestamp,
    pub trigger: String,
    pub status: String,
    pub requested_by: Option<DbId>,
    pub processing_started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub ledger_count: i32,
    pub external_count: i32,
    pub matched_count: i32,
    pub unmatched_local_count: i32,
    pub unmatched_external_count: i32,
    pub amount_mismatch_count: i32,
    pub date_mismatch_count: i32,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Counts written when a run completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunTotals {
    pub ledger_count: i32,
    pub external_count: i32,
    pub summary: ReconciliationSummary,
}

/// A row from the `reconciliation_discrepancies` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReconciliationDiscrepancy {
    pub id: DbId,
    pub run_id: DbId,
    pub kind: String,
    pub status: String,
    pub donation_id: Option<DbId>,
    pub transaction_id: Option<String>,
    pub local_amount_cents: Option<i64>,
    pub external_amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub local_occurred_at: Option<Timestamp>,
    pub external_occurred_at: Option<Timestamp>,
    pub detail: String,
    pub resolution_note: Option<String>,
    pub resolved_by: Option<DbId>,
    pub resolved_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for requesting a run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReconciliationRun {
    pub range_start: Timestamp,
    pub range_end: Timestamp,
    pub provider: Option<String>,
}
