//! Outbound delivery channels used by the background jobs.
//!
//! Each channel is a trait so jobs can be exercised against in-memory
//! fakes; the production implementations live in [`delivery`].

pub mod delivery;

use async_trait::async_trait;

pub use delivery::email::{EmailConfig, EmailError, SmtpEmailSender};
pub use delivery::sms::{SmsConfig, SmsError, TwilioSmsSender};
pub use delivery::webhook::{HttpWebhookSender, WebhookError};

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// A file attached to an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A plain-text email to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<EmailAttachment>,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: EmailAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

// ---------------------------------------------------------------------------
// SMS
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// One signed POST to a subscriber endpoint.
#[derive(Debug, Clone)]
pub struct WebhookRequest<'a> {
    pub url: &'a str,
    pub secret: &'a str,
    pub event_type: &'a str,
    pub delivery_id: i64,
    pub payload: &'a serde_json::Value,
}

/// What the subscriber answered. Any status is a response; only transport
/// failures are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, request: &WebhookRequest<'_>) -> Result<WebhookResponse, WebhookError>;
}
