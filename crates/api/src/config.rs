use benefactor_payments::StripeWebhookConfig;

use crate::auth::jwt::JwtConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// Everything except `JWT_SECRET` has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long in-flight requests may drain after a shutdown signal.
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    /// `None` when `STRIPE_WEBHOOK_SECRET` is unset; the webhook endpoint
    /// then rejects every delivery.
    pub stripe_webhook: Option<StripeWebhookConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    ///
    /// See [`JwtConfig`] and [`StripeWebhookConfig`] for their variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "PORT", 3000)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?;
        let shutdown_timeout_secs = parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?;
        let jwt = JwtConfig::from_lookup(&lookup)?;
        let stripe_webhook = StripeWebhookConfig::from_lookup(&lookup);

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt,
            stripe_webhook,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.stripe_webhook.is_none());
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = load(&[
            ("JWT_SECRET", "s3cret"),
            ("CORS_ORIGINS", "https://a.example.org, https://b.example.org,"),
        ])
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example.org", "https://b.example.org"]
        );
    }

    #[test]
    fn invalid_port_is_reported() {
        let err = load(&[("JWT_SECRET", "s3cret"), ("PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "PORT",
                value: "eighty".into()
            }
        );
    }

    #[test]
    fn missing_jwt_secret_fails() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn stripe_webhook_loaded_when_secret_present() {
        let config = load(&[
            ("JWT_SECRET", "s3cret"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_abc"),
            ("STRIPE_WEBHOOK_TOLERANCE_SECS", "60"),
        ])
        .unwrap();
        let stripe = config.stripe_webhook.unwrap();
        assert_eq!(stripe.secret, "whsec_abc");
        assert_eq!(stripe.tolerance_secs, 60);
        assert!(!stripe.livemode);
    }
}
