//! In-memory delivery fakes and seed helpers for the job tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use benefactor_core::reconciliation::{DateRange, ProcessorTransaction};
use benefactor_core::types::{DbId, Timestamp};
use benefactor_notify::{
    EmailError, EmailMessage, EmailSender, SmsError, SmsSender, WebhookError, WebhookRequest,
    WebhookResponse, WebhookSender,
};
use benefactor_payments::{PaymentError, PaymentProvider, PROVIDER_STRIPE};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Accepts every message except those addressed to something containing
/// "bounce".
#[derive(Default)]
pub struct FakeEmail {
    pub sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailSender for FakeEmail {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if message.to.contains("bounce") {
            return Err(EmailError::Build(format!("mailbox unavailable: {}", message.to)));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSms {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SmsSender for FakeSms {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// Answers every POST with a fixed status.
pub struct FakeWebhook {
    pub status: u16,
    pub calls: Mutex<Vec<(String, i64)>>,
}

impl FakeWebhook {
    pub fn answering(status: u16) -> Self {
        Self {
            status,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WebhookSender for FakeWebhook {
    async fn post(&self, request: &WebhookRequest<'_>) -> Result<WebhookResponse, WebhookError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.url.to_string(), request.delivery_id));
        Ok(WebhookResponse {
            status: self.status,
            body: format!("status {}", self.status),
        })
    }
}

/// Returns a fixed transaction list and remembers the requested window.
#[derive(Default)]
pub struct FakeProvider {
    pub transactions: Vec<ProcessorTransaction>,
    pub requested: Mutex<Vec<DateRange>>,
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn name(&self) -> &'static str {
        PROVIDER_STRIPE
    }

    async fn list_transactions(
        &self,
        range: &DateRange,
    ) -> Result<Vec<ProcessorTransaction>, PaymentError> {
        self.requested.lock().unwrap().push(*range);
        Ok(self.transactions.clone())
    }
}

pub fn email_only(email: &Arc<FakeEmail>) -> benefactor_worker::jobs::Channels {
    benefactor_worker::jobs::Channels {
        email: Some(email.clone() as Arc<dyn EmailSender>),
        sms: None,
    }
}

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

pub async fn insert_contact(
    pool: &PgPool,
    first_name: &str,
    email: Option<&str>,
    phone: Option<&str>,
    sms_opt_in: bool,
) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO contacts (first_name, last_name, email, phone, sms_opt_in) \
         VALUES ($1, 'Tester', $2, $3, $4) RETURNING id",
    )
    .bind(first_name)
    .bind(email)
    .bind(phone)
    .bind(sms_opt_in)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_user(pool: &PgPool, email: &str) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO users (email, first_name, last_name) VALUES ($1, 'Sam', 'Staff') RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_event(pool: &PgPool, name: &str, starts_at: Timestamp, status: &str) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO events (name, starts_at, location, status) \
         VALUES ($1, $2, 'Community Hall', $3) RETURNING id",
    )
    .bind(name)
    .bind(starts_at)
    .bind(status)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn register(pool: &PgPool, event_id: DbId, contact_id: DbId) {
    sqlx::query("INSERT INTO event_registrations (event_id, contact_id) VALUES ($1, $2)")
        .bind(event_id)
        .bind(contact_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_stripe_donation(
    pool: &PgPool,
    amount_cents: i64,
    reference: Option<&str>,
    donated_at: Timestamp,
) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO donations \
             (amount_cents, currency, donated_at, payment_status, provider, provider_reference) \
         VALUES ($1, 'usd', $2, 'succeeded', 'stripe', $3) RETURNING id",
    )
    .bind(amount_cents)
    .bind(donated_at)
    .bind(reference)
    .fetch_one(pool)
    .await
    .unwrap()
}
