#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use benefactor_api::auth::jwt::{generate_access_token, JwtConfig};
use benefactor_api::config::ServerConfig;
use benefactor_api::router::build_app_router;
use benefactor_api::state::AppState;
use benefactor_core::types::DbId;
use benefactor_db::models::donation::CreateDonation;
use benefactor_db::repositories::DonationRepo;
use benefactor_payments::{signature, StripeWebhookConfig};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const WEBHOOK_PATH: &str = "/api/v1/payments/stripe/webhook";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        stripe_webhook: Some(StripeWebhookConfig {
            secret: WEBHOOK_SECRET.to_string(),
            tolerance_secs: 300,
            livemode: false,
            event_lease_secs: 300,
        }),
    }
}

/// The production router over `pool`.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_config())
}

pub fn build_test_app_with(pool: PgPool, config: ServerConfig) -> Router {
    build_app_router(AppState {
        pool,
        config: Arc::new(config),
    })
}

pub fn token_for(user_id: DbId, role: &str) -> String {
    let config = test_config();
    generate_access_token(user_id, role, &config.jwt).unwrap()
}

pub fn admin_token() -> String {
    token_for(1, "admin")
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str, token: Option<&str>) -> Response<Body> {
    send(app, Method::GET, uri, token, None).await
}

pub async fn post_json(
    app: Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::POST, uri, token, Some(body)).await
}

pub async fn post_empty(app: Router, uri: &str, token: Option<&str>) -> Response<Body> {
    send(app, Method::POST, uri, token, None).await
}

/// Post a raw Stripe payload with the given `Stripe-Signature` value.
pub async fn post_webhook(
    app: Router,
    payload: &[u8],
    signature: Option<String>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    app.oneshot(builder.body(Body::from(payload.to_vec())).unwrap())
        .await
        .unwrap()
}

/// Post `event` signed with the test secret at the current time.
pub async fn post_signed_event(app: Router, event: &serde_json::Value) -> Response<Body> {
    let payload = serde_json::to_vec(event).unwrap();
    let header = signature::sign_header(&payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp());
    post_webhook(app, &payload, Some(header)).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// A pending card donation, optionally already linked to a Stripe reference.
pub async fn insert_donation(pool: &PgPool, amount_cents: i64, reference: Option<&str>) -> DbId {
    DonationRepo::create(
        pool,
        &CreateDonation {
            contact_id: None,
            amount_cents,
            currency: "usd".into(),
            donated_at: chrono::Utc::now(),
            payment_method: "card".into(),
            payment_status: "pending".into(),
            provider: reference.map(|_| "stripe".to_string()),
            provider_reference: reference.map(str::to_string),
        },
    )
    .await
    .unwrap()
    .id
}
