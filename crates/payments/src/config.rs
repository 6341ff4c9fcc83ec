//! Stripe configuration loaded from the environment.

/// Default allowed clock skew between Stripe's signature timestamp and now.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// How long an event may stay `processing` before a redelivery takes it over.
pub const DEFAULT_EVENT_LEASE_SECS: i64 = 300;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Settings for verifying inbound Stripe webhooks.
#[derive(Debug, Clone)]
pub struct StripeWebhookConfig {
    /// Endpoint signing secret (`whsec_...`).
    pub secret: String,
    pub tolerance_secs: i64,
    /// Whether this deployment expects live-mode events.
    pub livemode: bool,
    pub event_lease_secs: i64,
}

impl StripeWebhookConfig {
    /// Load from environment variables.
    ///
    /// | Variable                        | Required | Default |
    /// |---------------------------------|----------|---------|
    /// | `STRIPE_WEBHOOK_SECRET`         | yes      | (endpoint answers 400) |
    /// | `STRIPE_WEBHOOK_TOLERANCE_SECS` | no       | `300`   |
    /// | `STRIPE_LIVEMODE`               | no       | `false` |
    /// | `STRIPE_EVENT_LEASE_SECS`       | no       | `300`   |
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let secret = lookup("STRIPE_WEBHOOK_SECRET").filter(|s| !s.is_empty())?;
        Some(Self {
            secret,
            tolerance_secs: lookup("STRIPE_WEBHOOK_TOLERANCE_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECS),
            livemode: lookup("STRIPE_LIVEMODE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            event_lease_secs: lookup("STRIPE_EVENT_LEASE_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EVENT_LEASE_SECS),
        })
    }
}

/// Settings for calling the Stripe REST API.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
}

impl StripeConfig {
    /// Load from environment variables.
    ///
    /// | Variable            | Required | Default                  |
    /// |---------------------|----------|--------------------------|
    /// | `STRIPE_SECRET_KEY` | yes      | (reconciliation disabled) |
    /// | `STRIPE_API_BASE`   | no       | `https://api.stripe.com` |
    pub fn from_env() -> Option<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())?;
        Some(Self {
            secret_key,
            api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_config_needs_a_secret() {
        assert!(StripeWebhookConfig::from_lookup(|_| None).is_none());
        assert!(StripeWebhookConfig::from_lookup(|_| Some(String::new())).is_none());
    }

    #[test]
    fn webhook_config_defaults() {
        let config = StripeWebhookConfig::from_lookup(|key| match key {
            "STRIPE_WEBHOOK_SECRET" => Some("whsec_test".into()),
            "STRIPE_LIVEMODE" => Some("1".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.tolerance_secs, DEFAULT_WEBHOOK_TOLERANCE_SECS);
        assert_eq!(config.event_lease_secs, DEFAULT_EVENT_LEASE_SECS);
        assert!(config.livemode);
    }
}
