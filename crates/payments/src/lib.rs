//! Stripe integration: webhook signature verification, event decoding,
//! the acknowledgement contract, and the charge listing client used by
//! reconciliation.

pub mod ack;
pub mod config;
pub mod error;
pub mod event;
pub mod provider;
pub mod signature;
pub mod stripe;

pub use ack::WebhookAck;
pub use config::{StripeConfig, StripeWebhookConfig};
pub use error::PaymentError;
pub use provider::PaymentProvider;
pub use stripe::StripeClient;

/// Provider name stored in `donations.provider` and `reconciliation_runs.provider`.
pub const PROVIDER_STRIPE: &str = "stripe";
