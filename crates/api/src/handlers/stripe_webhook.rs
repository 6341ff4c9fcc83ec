//! Inbound Stripe webhooks.
//!
//! Signature failures are the only non-200 answer. Once a delivery is
//! authentic Stripe always gets a 200 with one of the [`WebhookAck`] bodies,
//! and the event id goes through the `stripe_webhook_events` log so each
//! event changes a donation at most once.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use benefactor_core::types::Timestamp;
use benefactor_db::models::donation::Donation;
use benefactor_db::repositories::{DonationRepo, StripeEventRepo};
use benefactor_payments::event::{Charge, EventKind, PaymentIntent, StripeEvent};
use benefactor_payments::{signature, StripeWebhookConfig, WebhookAck, PROVIDER_STRIPE};
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

const STALE_EVENT: &str = "donation already reflects a newer event";
const LIVEMODE_MISMATCH: &str = "livemode mismatch";

/// What applying a verified event did.
#[derive(Debug, PartialEq, Eq)]
enum Applied {
    Done,
    Stale(&'static str),
}

#[derive(Debug, thiserror::Error)]
enum HandlingError {
    #[error("malformed event object: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// POST /api/v1/payments/stripe/webhook
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let Some(config) = state.config.stripe_webhook.as_ref() else {
        tracing::warn!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not set");
        return Err(AppError::BadRequest(
            "Webhook signing secret is not configured".into(),
        ));
    };

    let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    signature::verify(
        &body,
        header,
        &config.secret,
        config.tolerance_secs,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Rejected Stripe webhook signature");
        AppError::BadRequest(e.to_string())
    })?;

    let event = StripeEvent::parse(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {e}")))?;

    let ack = acknowledge(&state.pool, config, &event).await;
    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        ack = ack.as_str(),
        "Stripe webhook acknowledged",
    );
    Ok(Json(ack.body()))
}

/// Run a verified event through the idempotency log and apply it.
async fn acknowledge(
    pool: &PgPool,
    config: &StripeWebhookConfig,
    event: &StripeEvent,
) -> WebhookAck {
    let event_at = event.created_at().unwrap_or_else(Utc::now);

    let begun = StripeEventRepo::begin(
        pool,
        &event.id,
        &event.event_type,
        event.livemode,
        event_at,
        config.event_lease_secs,
    )
    .await;
    match begun {
        Ok(true) => {}
        Ok(false) => return WebhookAck::Duplicate,
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "Failed to log Stripe event");
            return WebhookAck::ProcessingError;
        }
    }

    let applied = if event.livemode != config.livemode {
        Ok(Applied::Stale(LIVEMODE_MISMATCH))
    } else {
        apply(pool, event, event_at).await
    };

    let (ack, logged) = match applied {
        Ok(Applied::Done) => (
            WebhookAck::Received,
            StripeEventRepo::mark_processed(pool, &event.id).await,
        ),
        Ok(Applied::Stale(reason)) => (
            WebhookAck::Rejected,
            StripeEventRepo::mark_rejected(pool, &event.id, reason).await,
        ),
        Err(e) => {
            tracing::warn!(event_id = %event.id, error = %e, "Stripe event handling failed");
            (
                WebhookAck::ProcessingError,
                StripeEventRepo::mark_failed(pool, &event.id, &e.to_string()).await,
            )
        }
    };

    match logged {
        Ok(()) => ack,
        Err(e) => {
            tracing::error!(
                event_id = %event.id,
                error = %e,
                "Failed to record Stripe event outcome",
            );
            WebhookAck::ProcessingError
        }
    }
}

async fn apply(
    pool: &PgPool,
    event: &StripeEvent,
    event_at: Timestamp,
) -> Result<Applied, HandlingError> {
    let updated = match event.kind()? {
        EventKind::PaymentSucceeded(intent) => {
            let Some(donation) = donation_for_intent(pool, &intent).await? else {
                return Ok(unmatched(event));
            };
            DonationRepo::mark_succeeded(
                pool,
                donation.id,
                event_at,
                intent.amount_received,
                &intent.currency,
                PROVIDER_STRIPE,
                &intent.id,
            )
            .await?
        }
        EventKind::PaymentFailed(intent) => {
            let Some(donation) = donation_for_intent(pool, &intent).await? else {
                return Ok(unmatched(event));
            };
            DonationRepo::mark_failed(pool, donation.id, event_at, intent.failure_message()).await?
        }
        EventKind::ChargeRefunded(charge) => {
            let Some(donation) = donation_for_charge(pool, &charge).await? else {
                return Ok(unmatched(event));
            };
            DonationRepo::apply_refund(pool, donation.id, event_at, charge.amount_refunded).await?
        }
        EventKind::Unhandled => return Ok(Applied::Done),
    };

    Ok(if updated {
        Applied::Done
    } else {
        Applied::Stale(STALE_EVENT)
    })
}

fn unmatched(event: &StripeEvent) -> Applied {
    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "No donation matches Stripe event",
    );
    Applied::Done
}

/// By stored payment intent id first, then by the `donation_id` checkout
/// metadata for donations created before the intent existed.
async fn donation_for_intent(
    pool: &PgPool,
    intent: &PaymentIntent,
) -> Result<Option<Donation>, sqlx::Error> {
    let by_reference =
        DonationRepo::find_by_provider_reference(pool, PROVIDER_STRIPE, &intent.id).await?;
    if by_reference.is_some() {
        return Ok(by_reference);
    }
    match intent.donation_id() {
        Some(id) => DonationRepo::find_by_id(pool, id).await,
        None => Ok(None),
    }
}

async fn donation_for_charge(
    pool: &PgPool,
    charge: &Charge,
) -> Result<Option<Donation>, sqlx::Error> {
    if let Some(intent_id) = charge.payment_intent.as_deref() {
        let by_intent =
            DonationRepo::find_by_provider_reference(pool, PROVIDER_STRIPE, intent_id).await?;
        if by_intent.is_some() {
            return Ok(by_intent);
        }
    }
    DonationRepo::find_by_provider_reference(pool, PROVIDER_STRIPE, &charge.id).await
}
