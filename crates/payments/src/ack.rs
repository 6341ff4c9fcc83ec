//! Bodies returned to Stripe once a webhook signature has been verified.
//!
//! Every verified delivery is answered with HTTP 200 so Stripe stops
//! retrying; the body tells operators what happened.

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// Handled, or an event type this service ignores.
    Received,
    /// Event id already processed or currently being processed.
    Duplicate,
    /// Stale event: livemode mismatch or older than the state it would change.
    Rejected,
    /// Handling failed internally; a redelivery will be processed again.
    ProcessingError,
}

impl WebhookAck {
    pub fn body(self) -> Value {
        match self {
            Self::Received => json!({ "received": true }),
            Self::Duplicate => json!({ "received": true, "duplicate": true }),
            Self::Rejected => json!({ "received": true, "rejected": true }),
            Self::ProcessingError => json!({ "received": true, "processingError": true }),
        }
    }

    /// Short label for log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
            Self::ProcessingError => "processing_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_are_exact() {
        assert_eq!(
            serde_json::to_string(&WebhookAck::Received.body()).unwrap(),
            r#"{"received":true}"#
        );
        assert_eq!(
            WebhookAck::Duplicate.body(),
            serde_json::json!({"received": true, "duplicate": true})
        );
        assert_eq!(
            WebhookAck::Rejected.body(),
            serde_json::json!({"received": true, "rejected": true})
        );
        assert_eq!(
            WebhookAck::ProcessingError.body(),
            serde_json::json!({"received": true, "processingError": true})
        );
    }

    #[test]
    fn bodies_carry_only_their_own_flag() {
        for ack in [
            WebhookAck::Received,
            WebhookAck::Duplicate,
            WebhookAck::Rejected,
            WebhookAck::ProcessingError,
        ] {
            let body = ack.body();
            let object = body.as_object().unwrap();
            assert_eq!(object["received"], true);
            let expected_len = if ack == WebhookAck::Received { 1 } else { 2 };
            assert_eq!(object.len(), expected_len);
        }
    }
}
