//! Seed helpers shared by the repository tests.

#![allow(dead_code)]

use benefactor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

pub async fn insert_contact(
    pool: &PgPool,
    first_name: &str,
    email: Option<&str>,
    phone: Option<&str>,
    sms_opt_in: bool,
) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO contacts (first_name, last_name, email, phone, sms_opt_in) \
         VALUES ($1, 'Tester', $2, $3, $4) RETURNING id",
    )
    .bind(first_name)
    .bind(email)
    .bind(phone)
    .bind(sms_opt_in)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_user(pool: &PgPool, email: &str) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO users (email, first_name, last_name) VALUES ($1, 'Sam', 'Staff') RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_event(pool: &PgPool, name: &str, starts_at: Timestamp, status: &str) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO events (name, starts_at, location, status) \
         VALUES ($1, $2, 'Community Hall', $3) RETURNING id",
    )
    .bind(name)
    .bind(starts_at)
    .bind(status)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn register(pool: &PgPool, event_id: DbId, contact_id: DbId, status: &str) {
    sqlx::query(
        "INSERT INTO event_registrations (event_id, contact_id, status) VALUES ($1, $2, $3)",
    )
    .bind(event_id)
    .bind(contact_id)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
}

/// Push a claim into the past so the lease looks expired.
pub async fn age_claim(pool: &PgPool, table: &str, id: DbId, minutes: i32) {
    let query = format!(
        "UPDATE {table} \
         SET processing_started_at = processing_started_at - make_interval(mins => $2) \
         WHERE id = $1"
    );
    sqlx::query(&query)
        .bind(id)
        .bind(minutes)
        .execute(pool)
        .await
        .unwrap();
}
