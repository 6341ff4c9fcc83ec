//! Scheduled report definitions and run history.

use benefactor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `scheduled_reports` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScheduledReport {
    pub id: DbId,
    pub name: String,
    pub report_type: String,
    pub format: String,
    pub frequency: String,
    pub recipients: Vec<String>,
    pub next_run_at: Timestamp,
    pub is_active: bool,
    pub status: String,
    pub processing_started_at: Option<Timestamp>,
    pub last_run_at: Option<Timestamp>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduledReport {
    pub name: String,
    pub report_type: String,
    pub format: String,
    pub frequency: String,
    pub recipients: Vec<String>,
    pub next_run_at: Timestamp,
    pub created_by: Option<DbId>,
}

/// A row from the `scheduled_report_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScheduledReportRun {
    pub id: DbId,
    pub scheduled_report_id: DbId,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub status: String,
    pub row_count: i32,
    pub recipients_attempted: i32,
    pub recipients_succeeded: i32,
    pub error: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

/// Outcome of one run, recorded together with the schedule advance.
#[derive(Debug, Clone)]
pub struct NewReportRun {
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub status: String,
    pub row_count: i32,
    pub recipients_attempted: i32,
    pub recipients_succeeded: i32,
    pub error: Option<String>,
    pub started_at: Timestamp,
}
