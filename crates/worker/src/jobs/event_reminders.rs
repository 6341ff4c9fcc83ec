//! Event reminders: email and/or SMS to everyone registered for an event.

use async_trait::async_trait;
use benefactor_core::batch::{ClaimAndMark, DeliveryTally, Disposition, ItemOutcome};
use benefactor_core::reminders::{
    event_reminder_email_body, event_reminder_skip_reason, event_reminder_sms_body,
    event_reminder_subject, truncate_chars, ReminderChannel, MAX_SMS_CHARS,
};
use benefactor_core::types::DbId;
use benefactor_db::models::event_reminder::{ClaimedEventReminder, ReminderRecipient};
use benefactor_db::models::status::EventReminderStatus;
use benefactor_db::repositories::EventReminderRepo;
use benefactor_notify::EmailMessage;
use chrono::Utc;
use sqlx::PgPool;

use super::{as_count, Channels};

pub struct EventReminderJob {
    pool: PgPool,
    channels: Channels,
    batch_size: i64,
    lease_secs: i64,
}

impl EventReminderJob {
    pub fn new(pool: PgPool, channels: Channels, batch_size: i64, lease_secs: i64) -> Self {
        Self {
            pool,
            channels,
            batch_size,
            lease_secs,
        }
    }

    async fn deliver(
        &self,
        reminder: &ClaimedEventReminder,
        channel: ReminderChannel,
        recipients: &[ReminderRecipient],
    ) -> Disposition {
        let mut tally = DeliveryTally::default();
        let mut last_error: Option<String> = None;

        let email = self.channels.email.as_ref().filter(|_| channel.wants_email());
        let sms = self.channels.sms.as_ref().filter(|_| channel.wants_sms());

        for recipient in recipients {
            if let (Some(sender), Some(address)) = (email, recipient.reachable_email()) {
                let message = EmailMessage::new(
                    address,
                    event_reminder_subject(&reminder.event_name),
                    email_body(reminder, recipient),
                );
                match sender.send(&message).await {
                    Ok(()) => tally.record_success(),
                    Err(e) => {
                        tracing::warn!(
                            reminder_id = reminder.id,
                            contact_id = recipient.contact_id,
                            error = %e,
                            "Reminder email failed",
                        );
                        tally.record_failure();
                        last_error = Some(e.to_string());
                    }
                }
            }

            if let (Some(sender), Some(phone)) = (sms, recipient.reachable_phone()) {
                match sender.send(phone, &sms_body(reminder)).await {
                    Ok(()) => tally.record_success(),
                    Err(e) => {
                        tracing::warn!(
                            reminder_id = reminder.id,
                            contact_id = recipient.contact_id,
                            error = %e,
                            "Reminder SMS failed",
                        );
                        tally.record_failure();
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        if tally.attempted == 0 {
            return Disposition::skipped(no_delivery_reason(channel, &self.channels, recipients));
        }
        Disposition::from_tally(tally, last_error)
    }
}

fn email_body(reminder: &ClaimedEventReminder, recipient: &ReminderRecipient) -> String {
    let body = event_reminder_email_body(
        Some(recipient.first_name.as_str()),
        &reminder.event_name,
        reminder.event_starts_at,
        reminder.event_location.as_deref(),
    );
    match custom_message(reminder) {
        Some(note) => format!("{body}\n\n{note}"),
        None => body,
    }
}

fn sms_body(reminder: &ClaimedEventReminder) -> String {
    let body = event_reminder_sms_body(
        &reminder.event_name,
        reminder.event_starts_at,
        reminder.event_location.as_deref(),
    );
    match custom_message(reminder) {
        Some(note) => truncate_chars(&format!("{note} {body}"), MAX_SMS_CHARS),
        None => body,
    }
}

fn custom_message(reminder: &ClaimedEventReminder) -> Option<&str> {
    reminder
        .custom_message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
}

fn no_delivery_reason(
    channel: ReminderChannel,
    channels: &Channels,
    recipients: &[ReminderRecipient],
) -> &'static str {
    let email_ready = channel.wants_email() && channels.email.is_some();
    let sms_ready = channel.wants_sms() && channels.sms.is_some();
    if !email_ready && !sms_ready {
        "reminder channel not configured"
    } else if recipients.is_empty() {
        "no registered recipients"
    } else {
        "no reachable recipients"
    }
}

fn reminder_status(outcome: ItemOutcome) -> EventReminderStatus {
    match outcome {
        ItemOutcome::Sent => EventReminderStatus::Sent,
        ItemOutcome::Partial => EventReminderStatus::Partial,
        ItemOutcome::Failed => EventReminderStatus::Failed,
        ItemOutcome::Skipped => EventReminderStatus::Skipped,
    }
}

#[async_trait]
impl ClaimAndMark for EventReminderJob {
    type Item = ClaimedEventReminder;

    fn name(&self) -> &'static str {
        "event_reminders"
    }

    fn item_id(&self, item: &ClaimedEventReminder) -> DbId {
        item.id
    }

    async fn release_stale(&self) -> anyhow::Result<u64> {
        Ok(EventReminderRepo::release_stale(&self.pool, self.lease_secs).await?)
    }

    async fn claim(&self) -> anyhow::Result<Vec<ClaimedEventReminder>> {
        Ok(EventReminderRepo::claim_due(&self.pool, self.batch_size).await?)
    }

    async fn process(&self, item: &ClaimedEventReminder) -> anyhow::Result<Disposition> {
        if let Some(reason) =
            event_reminder_skip_reason(&item.event_status, item.event_starts_at, Utc::now())
        {
            return Ok(Disposition::skipped(reason));
        }
        let Some(channel) = ReminderChannel::parse(&item.channel) else {
            return Ok(Disposition::failed(format!("unknown channel '{}'", item.channel)));
        };

        let recipients = EventReminderRepo::list_recipients(&self.pool, item.event_id).await?;
        Ok(self.deliver(item, channel, &recipients).await)
    }

    async fn record(
        &self,
        item: &ClaimedEventReminder,
        disposition: &Disposition,
    ) -> anyhow::Result<bool> {
        Ok(EventReminderRepo::record_outcome(
            &self.pool,
            item.id,
            item.processing_started_at,
            reminder_status(disposition.outcome),
            as_count(disposition.tally.attempted),
            as_count(disposition.tally.succeeded),
            disposition.detail.as_deref(),
        )
        .await?)
    }
}
