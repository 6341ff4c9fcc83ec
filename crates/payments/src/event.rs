//! Stripe event payloads, decoded only as far as the handled types need.

use std::collections::HashMap;

use benefactor_core::types::Timestamp;
use chrono::DateTime;
use serde::Deserialize;

pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

/// Checkout puts our donation id here when it creates the payment intent.
pub const DONATION_ID_METADATA_KEY: &str = "donation_id";

/// Envelope of every Stripe event.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix seconds.
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub last_payment_error: Option<LastPaymentError>,
}

impl PaymentIntent {
    /// Donation id carried in the intent's metadata, if any.
    pub fn donation_id(&self) -> Option<i64> {
        self.metadata
            .get(DONATION_ID_METADATA_KEY)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.as_deref().or(e.code.as_deref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub currency: String,
    #[serde(default)]
    pub refunded: bool,
    pub status: String,
    /// Unix seconds.
    pub created: i64,
}

/// The event types this service acts on.
#[derive(Debug, Clone)]
pub enum EventKind {
    PaymentSucceeded(PaymentIntent),
    PaymentFailed(PaymentIntent),
    ChargeRefunded(Charge),
    /// Any other type: acknowledged and ignored.
    Unhandled,
}

impl StripeEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Decode `data.object` according to the event type.
    pub fn kind(&self) -> Result<EventKind, serde_json::Error> {
        let object = &self.data.object;
        Ok(match self.event_type.as_str() {
            PAYMENT_INTENT_SUCCEEDED => {
                EventKind::PaymentSucceeded(PaymentIntent::deserialize(object)?)
            }
            PAYMENT_INTENT_FAILED => EventKind::PaymentFailed(PaymentIntent::deserialize(object)?),
            CHARGE_REFUNDED => EventKind::ChargeRefunded(Charge::deserialize(object)?),
            _ => EventKind::Unhandled,
        })
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        DateTime::from_timestamp(self.created, 0)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn event(event_type: &str, object: serde_json::Value) -> StripeEvent {
        let raw = json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_760_000_000,
            "livemode": false,
            "data": { "object": object },
        });
        StripeEvent::parse(raw.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn decodes_succeeded_intent_with_metadata() {
        let e = event(
            PAYMENT_INTENT_SUCCEEDED,
            json!({
                "id": "pi_1",
                "amount": 5000,
                "amount_received": 5000,
                "currency": "usd",
                "metadata": { "donation_id": "17" },
                "last_payment_error": null
            }),
        );
        assert_matches!(e.kind().unwrap(), EventKind::PaymentSucceeded(pi) => {
            assert_eq!(pi.id, "pi_1");
            assert_eq!(pi.donation_id(), Some(17));
        });
        assert_eq!(e.created_at().unwrap().timestamp(), 1_760_000_000);
    }

    #[test]
    fn decodes_failure_message() {
        let e = event(
            PAYMENT_INTENT_FAILED,
            json!({
                "id": "pi_2",
                "amount": 2500,
                "currency": "usd",
                "last_payment_error": { "code": "card_declined", "message": null }
            }),
        );
        assert_matches!(e.kind().unwrap(), EventKind::PaymentFailed(pi) => {
            assert_eq!(pi.failure_message(), Some("card_declined"));
            assert_eq!(pi.donation_id(), None);
        });
    }

    #[test]
    fn decodes_refunded_charge() {
        let e = event(
            CHARGE_REFUNDED,
            json!({
                "id": "ch_1",
                "payment_intent": "pi_1",
                "amount": 5000,
                "amount_refunded": 1500,
                "currency": "usd",
                "refunded": false,
                "status": "succeeded",
                "created": 1_760_000_000
            }),
        );
        assert_matches!(e.kind().unwrap(), EventKind::ChargeRefunded(ch) => {
            assert_eq!(ch.amount_refunded, 1500);
            assert_eq!(ch.payment_intent.as_deref(), Some("pi_1"));
        });
    }

    #[test]
    fn other_types_are_unhandled() {
        let e = event("customer.created", json!({ "id": "cus_1" }));
        assert_matches!(e.kind().unwrap(), EventKind::Unhandled);
    }

    #[test]
    fn malformed_object_is_an_error() {
        let e = event(CHARGE_REFUNDED, json!({ "id": "ch_1" }));
        assert!(e.kind().is_err());
    }
}
