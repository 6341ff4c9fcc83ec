//! Follow-up reminders: one email to the assigned staff member ahead of the
//! task's due time.

use async_trait::async_trait;
use benefactor_core::batch::{ClaimAndMark, Disposition, ItemOutcome};
use benefactor_core::reminders::{follow_up_email_body, follow_up_skip_reason, follow_up_subject};
use benefactor_core::types::DbId;
use benefactor_db::models::follow_up::ClaimedFollowUp;
use benefactor_db::models::status::FollowUpReminderStatus;
use benefactor_db::repositories::FollowUpRepo;
use benefactor_notify::EmailMessage;
use sqlx::PgPool;

use super::Channels;

pub struct FollowUpJob {
    pool: PgPool,
    channels: Channels,
    batch_size: i64,
    lease_secs: i64,
}

impl FollowUpJob {
    pub fn new(pool: PgPool, channels: Channels, batch_size: i64, lease_secs: i64) -> Self {
        Self {
            pool,
            channels,
            batch_size,
            lease_secs,
        }
    }
}

fn build_message(item: &ClaimedFollowUp, to: &str) -> EmailMessage {
    let contact = item
        .contact_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("a contact");
    EmailMessage::new(
        to,
        follow_up_subject(&item.subject),
        follow_up_email_body(
            item.assignee_name.as_deref(),
            contact,
            &item.subject,
            item.due_at,
            item.notes.as_deref(),
        ),
    )
}

#[async_trait]
impl ClaimAndMark for FollowUpJob {
    type Item = ClaimedFollowUp;

    fn name(&self) -> &'static str {
        "follow_ups"
    }

    fn item_id(&self, item: &ClaimedFollowUp) -> DbId {
        item.id
    }

    async fn release_stale(&self) -> anyhow::Result<u64> {
        Ok(FollowUpRepo::release_stale(&self.pool, self.lease_secs).await?)
    }

    async fn claim(&self) -> anyhow::Result<Vec<ClaimedFollowUp>> {
        Ok(FollowUpRepo::claim_due(&self.pool, self.batch_size).await?)
    }

    async fn process(&self, item: &ClaimedFollowUp) -> anyhow::Result<Disposition> {
        if let Some(reason) = follow_up_skip_reason(&item.status, item.assignee_email.as_deref()) {
            return Ok(Disposition::skipped(reason));
        }
        let Some(sender) = self.channels.email.as_ref() else {
            return Ok(Disposition::skipped("email channel not configured"));
        };
        let to = item.assignee_email.as_deref().map(str::trim).unwrap_or_default();

        match sender.send(&build_message(item, to)).await {
            Ok(()) => Ok(Disposition::sent()),
            Err(e) => Ok(Disposition::failed(e.to_string())),
        }
    }

    async fn record(
        &self,
        item: &ClaimedFollowUp,
        disposition: &Disposition,
    ) -> anyhow::Result<bool> {
        let status = match disposition.outcome {
            ItemOutcome::Sent => FollowUpReminderStatus::Sent,
            ItemOutcome::Skipped => FollowUpReminderStatus::Skipped,
            ItemOutcome::Failed | ItemOutcome::Partial => FollowUpReminderStatus::Failed,
        };
        Ok(FollowUpRepo::record_outcome(
            &self.pool,
            item.id,
            item.processing_started_at,
            status,
            disposition.detail.as_deref(),
        )
        .await?)
    }
}
