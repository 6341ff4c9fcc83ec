//! SMS delivery through a Twilio-compatible messages API.
//!
//! Messages are POSTed as a form to
//! `{api_base}/2010-04-01/Accounts/{account_sid}/Messages.json` with HTTP
//! basic auth. [`SmsConfig::from_env`] returns `None` when the account is
//! not configured, which disables the SMS channel.

use std::time::Duration;

use async_trait::async_trait;

use crate::SmsSender;

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest provider error body kept in the error message.
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("SMS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("SMS provider returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid phone number: {0}")]
    InvalidNumber(String),
}

// ---------------------------------------------------------------------------
// SmsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

impl SmsConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable          | Required | Default                  |
    /// |-------------------|----------|--------------------------|
    /// | `SMS_ACCOUNT_SID` | yes      | (channel disabled)       |
    /// | `SMS_AUTH_TOKEN`  | yes      | (channel disabled)       |
    /// | `SMS_FROM_NUMBER` | yes      | (channel disabled)       |
    /// | `SMS_API_BASE`    | no       | `https://api.twilio.com` |
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Some(Self {
            account_sid: var("SMS_ACCOUNT_SID")?,
            auth_token: var("SMS_AUTH_TOKEN")?,
            from_number: var("SMS_FROM_NUMBER")?,
            api_base: var("SMS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

// ---------------------------------------------------------------------------
// TwilioSmsSender
// ---------------------------------------------------------------------------

pub struct TwilioSmsSender {
    config: SmsConfig,
    client: reqwest::Client,
}

impl TwilioSmsSender {
    pub fn new(config: SmsConfig) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { config, client })
    }
}

/// Strip formatting characters, keeping a leading `+`. Rejects numbers with
/// fewer than seven digits.
pub fn normalize_phone(raw: &str) -> Result<String, SmsError> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 7 {
        return Err(SmsError::InvalidNumber(raw.to_string()));
    }
    if trimmed.starts_with('+') {
        Ok(format!("+{digits}"))
    } else {
        Ok(digits)
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let to = normalize_phone(to)?;
        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmsError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        tracing::debug!(to = %to, "SMS sent");
        Ok(())
    }
}
