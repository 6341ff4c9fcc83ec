//! HS256 access-token generation and validation.

use benefactor_core::types::DbId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// JWT claims carried by every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the staff user's id.
    pub sub: DbId,
    /// Role name, e.g. `"admin"` or `"staff"`.
    pub role: String,
    /// Expiration (UTC unix seconds).
    pub exp: i64,
    /// Issued at (UTC unix seconds).
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 signing secret shared with the token issuer.
    pub secret: String,
    /// Lifetime of tokens minted by [`generate_access_token`].
    pub access_token_expiry_mins: i64,
}

const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;

impl JwtConfig {
    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `JWT_SECRET`             | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS` | no       | `15`    |
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let access_token_expiry_mins = match lookup("JWT_ACCESS_EXPIRY_MINS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "JWT_ACCESS_EXPIRY_MINS",
                value: raw,
            })?,
            None => DEFAULT_ACCESS_EXPIRY_MINS,
        };

        Ok(Self {
            secret,
            access_token_expiry_mins,
        })
    }
}

/// Mint a token for `user_id`. The issuing application owns logins; this is
/// used by operational tooling and tests.
pub fn generate_access_token(
    user_id: DbId,
    role: &str,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: now + config.access_token_expiry_mins * 60,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Verify signature and expiry, returning the embedded [`Claims`].
pub fn validate_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
