#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Payment provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected payment provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Payment provider is not configured")]
    NotConfigured,
}
