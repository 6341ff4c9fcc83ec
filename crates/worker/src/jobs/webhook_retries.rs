//! Outbound webhook delivery with durable retries.
//!
//! Each claimed delivery gets one signed POST per batch. The retry policy
//! turns the attempt into `delivered`, `retrying` (with `next_retry_at`
//! pushed out by the backoff schedule) or `failed`.

use std::sync::Arc;

use async_trait::async_trait;
use benefactor_core::batch::{ClaimAndMark, Disposition, WorkItem};
use benefactor_core::retry::{AttemptClass, RetryDecision, RetryPolicy};
use benefactor_core::types::DbId;
use benefactor_db::models::webhook::{AttemptRecord, ClaimedDelivery};
use benefactor_db::repositories::WebhookRepo;
use benefactor_notify::{WebhookRequest, WebhookResponse, WebhookSender};
use sqlx::PgPool;

const ENDPOINT_DISABLED: &str = "endpoint disabled";

pub type DeliveryItem = WorkItem<ClaimedDelivery, WebhookResponse>;

pub struct WebhookRetryJob {
    pool: PgPool,
    sender: Arc<dyn WebhookSender>,
    policy: RetryPolicy,
    batch_size: i64,
    lease_secs: i64,
}

impl WebhookRetryJob {
    pub fn new(
        pool: PgPool,
        sender: Arc<dyn WebhookSender>,
        policy: RetryPolicy,
        batch_size: i64,
        lease_secs: i64,
    ) -> Self {
        Self {
            pool,
            sender,
            policy,
            batch_size,
            lease_secs,
        }
    }
}

/// What to write back for one attempt. `None` means no request was made
/// (endpoint gone or disabled) and the delivery fails without counting an
/// attempt.
pub fn plan_attempt(
    policy: &RetryPolicy,
    delivery: &ClaimedDelivery,
    response: Option<&WebhookResponse>,
    error: Option<&str>,
) -> (RetryDecision, AttemptRecord) {
    if delivery.active_target().is_none() {
        let record = AttemptRecord {
            attempt_count: delivery.attempt_count,
            error: Some(ENDPOINT_DISABLED.to_string()),
            ..Default::default()
        };
        return (RetryDecision::GiveUp, record);
    }

    let attempts = delivery.attempt_count + 1;
    let class = response
        .map(|r| AttemptClass::from_status(r.status))
        .unwrap_or(AttemptClass::Retryable);
    let decision = policy.decide(class, attempts, delivery.max_attempts);

    let record = AttemptRecord {
        attempt_count: attempts,
        response_status_code: response.and_then(|r| i16::try_from(r.status).ok()),
        response_body: response.map(|r| r.body.clone()).filter(|b| !b.is_empty()),
        error: match decision {
            RetryDecision::Delivered => None,
            _ => error.map(str::to_string),
        },
    };
    (decision, record)
}

#[async_trait]
impl ClaimAndMark for WebhookRetryJob {
    type Item = DeliveryItem;

    fn name(&self) -> &'static str {
        "webhook_retries"
    }

    fn item_id(&self, item: &DeliveryItem) -> DbId {
        item.row.id
    }

    async fn release_stale(&self) -> anyhow::Result<u64> {
        Ok(WebhookRepo::release_stale(&self.pool, self.lease_secs).await?)
    }

    async fn claim(&self) -> anyhow::Result<Vec<DeliveryItem>> {
        let rows = WebhookRepo::claim_due(&self.pool, self.batch_size).await?;
        Ok(rows.into_iter().map(WorkItem::new).collect())
    }

    async fn process(&self, item: &DeliveryItem) -> anyhow::Result<Disposition> {
        let delivery = &item.row;
        let Some((url, secret)) = delivery.active_target() else {
            return Ok(Disposition::failed(ENDPOINT_DISABLED));
        };

        let request = WebhookRequest {
            url,
            secret,
            event_type: &delivery.event_type,
            delivery_id: delivery.id,
            payload: &delivery.payload,
        };

        match self.sender.post(&request).await {
            Ok(response) => {
                let disposition = match AttemptClass::from_status(response.status) {
                    AttemptClass::Success => Disposition::sent(),
                    _ => Disposition::failed(format!("HTTP {}", response.status)),
                };
                item.set_computed(response);
                Ok(disposition)
            }
            Err(e) => Ok(Disposition::failed(e.to_string())),
        }
    }

    async fn record(&self, item: &DeliveryItem, disposition: &Disposition) -> anyhow::Result<bool> {
        let delivery = &item.row;
        let claimed_at = delivery.processing_started_at;
        let (decision, attempt) = plan_attempt(
            &self.policy,
            delivery,
            item.computed(),
            disposition.detail.as_deref(),
        );

        let recorded = match decision {
            RetryDecision::Delivered => {
                WebhookRepo::mark_delivered(&self.pool, delivery.id, claimed_at, &attempt).await?
            }
            RetryDecision::RetryIn(delay) => {
                let delay_secs = i64::try_from(delay.as_secs()).unwrap_or(i64::MAX);
                tracing::info!(
                    delivery_id = delivery.id,
                    attempt = attempt.attempt_count,
                    delay_secs,
                    "Webhook delivery will be retried",
                );
                WebhookRepo::schedule_retry(
                    &self.pool,
                    delivery.id,
                    claimed_at,
                    &attempt,
                    delay_secs,
                )
                .await?
            }
            RetryDecision::GiveUp => {
                tracing::warn!(
                    delivery_id = delivery.id,
                    attempt = attempt.attempt_count,
                    error = attempt.error.as_deref().unwrap_or_default(),
                    "Webhook delivery failed permanently",
                );
                WebhookRepo::mark_failed(&self.pool, delivery.id, claimed_at, &attempt).await?
            }
        };
        Ok(recorded)
    }
}
