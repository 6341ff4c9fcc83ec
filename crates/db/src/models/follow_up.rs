//! Follow-up task rows.

use benefactor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `follow_ups` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FollowUp {
    pub id: DbId,
    pub contact_id: Option<DbId>,
    pub assigned_to: Option<DbId>,
    pub subject: String,
    pub notes: Option<String>,
    pub due_at: Timestamp,
    pub reminder_lead_minutes: i32,
    pub status: String,
    pub reminder_status: String,
    pub processing_started_at: Option<Timestamp>,
    pub reminder_sent_at: Option<Timestamp>,
    pub reminder_error: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A claimed follow-up joined with its assignee and contact.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedFollowUp {
    pub id: DbId,
    pub subject: String,
    pub notes: Option<String>,
    pub due_at: Timestamp,
    pub status: String,
    pub processing_started_at: Timestamp,
    pub assignee_email: Option<String>,
    pub assignee_name: Option<String>,
    pub contact_name: Option<String>,
}

/// DTO for creating a follow-up.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFollowUp {
    pub contact_id: Option<DbId>,
    pub assigned_to: Option<DbId>,
    pub subject: String,
    pub notes: Option<String>,
    pub due_at: Timestamp,
    pub reminder_lead_minutes: Option<i32>,
}
