//! `Stripe-Signature` header verification.
//!
//! The header looks like `t=1700000000,v1=<hex>,v1=<hex>,v0=<hex>`. The
//! signed payload is `"{t}.{raw body}"` under HMAC-SHA256 with the endpoint
//! secret. A delivery is accepted when any `v1` signature matches (Stripe
//! sends several during secret rotation) and `t` is within the tolerance.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing Stripe-Signature header")]
    Missing,

    #[error("Malformed Stripe-Signature header")]
    Malformed,

    #[error("Signature timestamp outside tolerance")]
    TimestampOutsideTolerance,

    #[error("No signature matches the payload")]
    NoMatch,
}

/// Parsed header: timestamp and decoded `v1` signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

/// Parse a header value. Unknown schemes (`v0`, ...) are ignored; entries
/// that are not valid hex are skipped.
pub fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(SignatureError::Malformed),
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verify `header` against the raw body. `now` is unix seconds.
pub fn verify(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<i64, SignatureError> {
    let header = parse_header(header.ok_or(SignatureError::Missing)?)?;

    if now.abs_diff(header.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::TimestampOutsideTolerance);
    }

    let mac = mac_for(secret, header.timestamp, payload)?;
    let matched = header
        .signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok());

    if matched {
        Ok(header.timestamp)
    } else {
        Err(SignatureError::NoMatch)
    }
}

/// Build a valid header for `payload`. Used by tests and local tooling that
/// replays events.
pub fn sign_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    match mac_for(secret, timestamp, payload) {
        Ok(mac) => format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())),
        Err(_) => format!("t={timestamp}"),
    }
}
