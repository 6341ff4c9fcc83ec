use async_trait::async_trait;
use benefactor_core::reconciliation::{DateRange, ProcessorTransaction};

use crate::error::PaymentError;

/// Source of processor-side transactions for reconciliation.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Value stored in `provider` columns.
    fn name(&self) -> &'static str;

    /// Settled transactions created inside `range`, amounts net of refunds.
    async fn list_transactions(
        &self,
        range: &DateRange,
    ) -> Result<Vec<ProcessorTransaction>, PaymentError>;
}
