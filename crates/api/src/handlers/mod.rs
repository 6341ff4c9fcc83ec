pub mod reconciliation;
pub mod scheduled_reports;
pub mod stripe_webhook;
pub mod webhooks;
