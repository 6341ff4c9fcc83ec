//! Stripe webhook idempotency log.

use benefactor_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `stripe_webhook_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StripeWebhookEvent {
    pub id: DbId,
    pub event_id: String,
    pub event_type: String,
    pub livemode: bool,
    pub event_created_at: Timestamp,
    pub status: String,
    pub attempts: i32,
    pub error: Option<String>,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}
