//! Minimal Stripe REST client: lists charges for reconciliation.

use std::time::Duration;

use async_trait::async_trait;
use benefactor_core::reconciliation::{DateRange, ProcessorTransaction};
use chrono::DateTime;
use serde::Deserialize;

use crate::config::StripeConfig;
use crate::error::PaymentError;
use crate::event::Charge;
use crate::provider::PaymentProvider;
use crate::PROVIDER_STRIPE;

const PAGE_SIZE: u32 = 100;

/// Hard stop for pagination; a day of charges never comes close.
const MAX_PAGES: usize = 500;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ChargeList {
    data: Vec<Charge>,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

pub struct StripeClient {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { config, client })
    }

    async fn fetch_page(
        &self,
        range: &DateRange,
        starting_after: Option<&str>,
    ) -> Result<ChargeList, PaymentError> {
        let mut query = vec![
            ("created[gte]", range.start.timestamp().to_string()),
            ("created[lt]", range.end.timestamp().to_string()),
            ("limit", PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = starting_after {
            query.push(("starting_after", cursor.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/v1/charges", self.config.api_base.trim_end_matches('/')))
            .bearer_auth(&self.config.secret_key)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorBody>(&bytes)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Settled charges become transactions; amounts are net of refunds.
pub fn charge_to_transaction(charge: Charge) -> Option<ProcessorTransaction> {
    if charge.status != "succeeded" {
        return None;
    }
    Some(ProcessorTransaction {
        amount_cents: charge.amount - charge.amount_refunded,
        occurred_at: DateTime::from_timestamp(charge.created, 0)?,
        transaction_id: charge.id,
        payment_intent_id: charge.payment_intent,
        currency: charge.currency.to_lowercase(),
    })
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn name(&self) -> &'static str {
        PROVIDER_STRIPE
    }

    async fn list_transactions(
        &self,
        range: &DateRange,
    ) -> Result<Vec<ProcessorTransaction>, PaymentError> {
        let mut transactions = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(range, cursor.as_deref()).await?;
            cursor = page.data.last().map(|c| c.id.clone());
            let has_more = page.has_more && cursor.is_some();
            transactions.extend(page.data.into_iter().filter_map(charge_to_transaction));
            if !has_more {
                break;
            }
        }

        tracing::debug!(
            count = transactions.len(),
            start = %range.start,
            end = %range.end,
            "Fetched Stripe charges"
        );
        Ok(transactions)
    }
}
