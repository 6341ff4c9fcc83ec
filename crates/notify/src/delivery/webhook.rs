//! Signed outbound webhook delivery.
//!
//! [`HttpWebhookSender`] makes exactly one POST per call. Retry scheduling
//! is durable and owned by the webhook retry job, not by this client.
//!
//! Every request carries:
//!
//! | Header                   | Value                                  |
//! |--------------------------|----------------------------------------|
//! | `X-Benefactor-Signature` | `t=<unix seconds>,v1=<hex HMAC-SHA256>` |
//! | `X-Benefactor-Event`     | event type                             |
//! | `X-Benefactor-Delivery`  | delivery id                            |
//!
//! The HMAC is computed with the endpoint secret over `"{t}.{body}"`.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{WebhookRequest, WebhookResponse, WebhookSender};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Benefactor-Signature";
pub const EVENT_HEADER: &str = "X-Benefactor-Event";
pub const DELIVERY_HEADER: &str = "X-Benefactor-Delivery";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response bodies are stored for debugging; keep them short.
const MAX_RESPONSE_BODY: usize = 2_000;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid signing key")]
    InvalidKey,
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn signature_header(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
    Ok(format!("t={timestamp},v1={}", sign(secret, timestamp, body)?))
}

// ---------------------------------------------------------------------------
// HttpWebhookSender
// ---------------------------------------------------------------------------

pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("benefactor-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post(&self, request: &WebhookRequest<'_>) -> Result<WebhookResponse, WebhookError> {
        let body = serde_json::to_vec(request.payload)?;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = signature_header(request.secret, timestamp, &body)?;

        let response = self
            .client
            .post(request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, request.event_type)
            .header(DELIVERY_HEADER, request.delivery_id.to_string())
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Ok(WebhookResponse {
            status,
            body: text.chars().take(MAX_RESPONSE_BODY).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_keyed() {
        let a = sign("whsec_1", 1_700_000_000, b"{\"a\":1}").unwrap();
        let b = sign("whsec_1", 1_700_000_000, b"{\"a\":1}").unwrap();
        let other_key = sign("whsec_2", 1_700_000_000, b"{\"a\":1}").unwrap();
        let other_time = sign("whsec_1", 1_700_000_001, b"{\"a\":1}").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, other_key);
        assert_ne!(a, other_time);
    }

    #[test]
    fn signature_covers_timestamp_dot_body() {
        let mut mac = HmacSha256::new_from_slice(b"k").unwrap();
        mac.update(b"42.hello");
        let expected = hex::encode(mac.finalize().into_bytes());
        assert_eq!(sign("k", 42, b"hello").unwrap(), expected);
    }

    #[test]
    fn header_format() {
        let header = signature_header("k", 42, b"hello").unwrap();
        assert!(header.starts_with("t=42,v1="));
    }

    #[test]
    fn sender_builds() {
        assert!(HttpWebhookSender::new().is_ok());
    }
}
