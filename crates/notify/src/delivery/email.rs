//! SMTP email delivery.
//!
//! [`SmtpEmailSender`] wraps the `lettre` async SMTP transport. If
//! `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns `None` and the
//! email channel is treated as unconfigured.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::{EmailMessage, EmailSender};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

const DEFAULT_SMTP_PORT: u16 = 587;

const DEFAULT_FROM_ADDRESS: &str = "noreply@benefactor.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable        | Required | Default                     |
    /// |-----------------|----------|-----------------------------|
    /// | `SMTP_HOST`     | yes      | (channel disabled if unset) |
    /// | `SMTP_PORT`     | no       | `587`                       |
    /// | `SMTP_FROM`     | no       | `noreply@benefactor.local`  |
    /// | `SMTP_USER`     | no       | none                        |
    /// | `SMTP_PASSWORD` | no       | none                        |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty())?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpEmailSender
// ---------------------------------------------------------------------------

pub struct SmtpEmailSender {
    from_address: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    /// Build the STARTTLS transport. Connections are opened lazily on send.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (config.smtp_user, config.smtp_password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        Ok(Self {
            from_address: config.from_address,
            mailer: builder.build(),
        })
    }
}

/// Assemble the MIME message: plain text, or multipart/mixed when there are
/// attachments.
pub fn build_message(from: &str, message: &EmailMessage) -> Result<Message, EmailError> {
    let builder = Message::builder()
        .from(from.parse()?)
        .to(message.to.parse()?)
        .subject(message.subject.as_str());

    let built = if message.attachments.is_empty() {
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
    } else {
        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
        for attachment in &message.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| EmailError::Build(e.to_string()))?;
            parts = parts.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }
        builder.multipart(parts)
    };

    built.map_err(|e| EmailError::Build(e.to_string()))
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let email = build_message(&self.from_address, message)?;
        self.mailer.send(email).await?;
        tracing::debug!(
            to = %message.to,
            attachments = message.attachments.len(),
            "Email sent"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmailAttachment;

    #[test]
    fn from_env_returns_none_without_smtp_host() {
        std::env::remove_var("SMTP_HOST");
        assert!(EmailConfig::from_env().is_none());
    }

    #[test]
    fn plain_message_builds() {
        let msg = EmailMessage::new("ada@example.org", "Reminder: Gala", "See you there");
        let built = build_message("noreply@benefactor.local", &msg).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();
        assert!(raw.contains("Subject: Reminder: Gala"));
        assert!(raw.contains("See you there"));
    }

    #[test]
    fn attachment_makes_multipart_message() {
        let msg = EmailMessage::new("board@example.org", "Weekly gifts", "Attached.")
            .with_attachment(EmailAttachment {
                filename: "donation_summary-2026-05-01.csv".into(),
                content_type: "text/csv".into(),
                data: b"day,total\n".to_vec(),
            });
        let built = build_message("noreply@benefactor.local", &msg).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("donation_summary-2026-05-01.csv"));
    }

    #[test]
    fn bad_recipient_is_an_address_error() {
        let msg = EmailMessage::new("not-an-email", "s", "b");
        let err = build_message("noreply@benefactor.local", &msg).unwrap_err();
        assert!(matches!(err, EmailError::Address(_)));
    }
}
