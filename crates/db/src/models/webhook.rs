//! Outbound webhook endpoints and deliveries.

use benefactor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `webhook_endpoints` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEndpoint {
    pub id: DbId,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub event_types: serde_json::Value,
    pub is_enabled: bool,
    pub last_triggered_at: Option<Timestamp>,
    pub failure_count: i32,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering an endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhookEndpoint {
    pub name: String,
    pub url: String,
    pub secret: String,
    #[serde(default)]
    pub event_types: Vec<String>,
    pub created_by: Option<DbId>,
}

/// A row from the `webhook_deliveries` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookDelivery {
    pub id: DbId,
    pub endpoint_id: Option<DbId>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_retry_at: Timestamp,
    pub processing_started_at: Option<Timestamp>,
    pub response_status_code: Option<i16>,
    pub response_body: Option<String>,
    pub last_error: Option<String>,
    pub delivered_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A claimed delivery joined with its endpoint. The endpoint columns are
/// `None` when the endpoint was deleted.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedDelivery {
    pub id: DbId,
    pub endpoint_id: Option<DbId>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub processing_started_at: Timestamp,
    pub endpoint_url: Option<String>,
    pub endpoint_secret: Option<String>,
    pub endpoint_enabled: Option<bool>,
}

impl ClaimedDelivery {
    /// URL and secret if the endpoint still exists and is enabled.
    pub fn active_target(&self) -> Option<(&str, &str)> {
        match (
            self.endpoint_enabled,
            self.endpoint_url.as_deref(),
            self.endpoint_secret.as_deref(),
        ) {
            (Some(true), Some(url), Some(secret)) => Some((url, secret)),
            _ => None,
        }
    }
}

/// Result of one attempt, written back under the claim token.
#[derive(Debug, Clone, Default)]
pub struct AttemptRecord {
    pub attempt_count: i32,
    pub response_status_code: Option<i16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
}
