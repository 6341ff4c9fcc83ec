mod common;

use axum::http::StatusCode;
use benefactor_core::reconciliation::{Discrepancy, DiscrepancyKind};
use benefactor_core::types::DbId;
use benefactor_db::models::reconciliation::RunTotals;
use benefactor_db::repositories::ReconciliationRepo;
use chrono::{Duration, TimeZone, Utc};
use common::{admin_token, body_json, get, post_json, token_for};
use serde_json::json;
use sqlx::PgPool;

const RUNS: &str = "/api/v1/admin/reconciliation/runs";

/// A completed run with two open `unmatched_external` findings.
async fn completed_run_with_findings(pool: &PgPool) -> DbId {
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    let run = ReconciliationRepo::create_run(pool, "stripe", start, start + Duration::days(1), None)
        .await
        .unwrap();
    let claimed = ReconciliationRepo::claim_pending(pool, 10).await.unwrap();
    let claimed_at = claimed[0].processing_started_at.unwrap();

    let finding = |txn: &str| Discrepancy {
        kind: DiscrepancyKind::UnmatchedExternal,
        donation_id: None,
        transaction_id: Some(txn.to_string()),
        local_amount_cents: None,
        external_amount_cents: Some(1_000),
        currency: Some("usd".into()),
        local_occurred_at: None,
        external_occurred_at: Some(start + Duration::hours(2)),
        detail: "processor transaction has no ledger entry".into(),
    };
    let recorded = ReconciliationRepo::complete_run(
        pool,
        run.id,
        claimed_at,
        &RunTotals::default(),
        &[finding("ch_1"), finding("ch_2")],
    )
    .await
    .unwrap();
    assert!(recorded);
    run.id
}

async fn first_discrepancy_id(pool: &PgPool, run_id: DbId) -> DbId {
    ReconciliationRepo::list_discrepancies(pool, run_id, None, 10, 0)
        .await
        .unwrap()[0]
        .id
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_requests_a_run(pool: PgPool) {
    let token = token_for(7, "admin");
    let response = post_json(
        common::build_test_app(pool),
        RUNS,
        Some(token.as_str()),
        json!({ "range_start": "2026-05-01T00:00:00Z", "range_end": "2026-05-02T00:00:00Z" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "pending");
    assert_eq!(json["data"]["trigger"], "manual");
    assert_eq!(json["data"]["provider"], "stripe");
    assert_eq!(json["data"]["requested_by"], 7);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_open_run_for_range_conflicts(pool: PgPool) {
    let token = admin_token();
    let body = json!({
        "range_start": "2026-05-01T00:00:00Z",
        "range_end": "2026-05-02T00:00:00Z",
    });

    let first = post_json(
        common::build_test_app(pool.clone()),
        RUNS,
        Some(token.as_str()),
        body.clone(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = post_json(common::build_test_app(pool), RUNS, Some(token.as_str()), body).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["code"], "CONFLICT");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn inverted_range_is_rejected(pool: PgPool) {
    let response = post_json(
        common::build_test_app(pool),
        RUNS,
        Some(admin_token().as_str()),
        json!({ "range_start": "2026-05-02T00:00:00Z", "range_end": "2026-05-01T00:00:00Z" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unsupported_provider_is_rejected(pool: PgPool) {
    let response = post_json(
        common::build_test_app(pool),
        RUNS,
        Some(admin_token().as_str()),
        json!({
            "range_start": "2026-05-01T00:00:00Z",
            "range_end": "2026-05-02T00:00:00Z",
            "provider": "paypal",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn run_detail_and_listing(pool: PgPool) {
    let run_id = completed_run_with_findings(&pool).await;
    let token = admin_token();

    let response = get(
        common::build_test_app(pool.clone()),
        &format!("{RUNS}/{run_id}"),
        Some(token.as_str()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "completed");

    let response = get(common::build_test_app(pool.clone()), RUNS, Some(token.as_str())).await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let missing = format!("{RUNS}/999999");
    let response = get(common::build_test_app(pool), &missing, Some(token.as_str())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Discrepancies
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn discrepancies_filter_by_status(pool: PgPool) {
    let run_id = completed_run_with_findings(&pool).await;
    let token = admin_token();
    let discrepancy_id = first_discrepancy_id(&pool, run_id).await;

    let response = post_json(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/admin/reconciliation/discrepancies/{discrepancy_id}/resolve"),
        Some(token.as_str()),
        json!({ "status": "ignored", "note": "test charge" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let uri = format!("{RUNS}/{run_id}/discrepancies?status=open");
    let response = get(common::build_test_app(pool.clone()), &uri, Some(token.as_str())).await;
    let json = body_json(response).await;
    let open = json["data"].as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["transaction_id"], "ch_2");

    let uri = format!("{RUNS}/{run_id}/discrepancies");
    let response = get(common::build_test_app(pool.clone()), &uri, Some(token.as_str())).await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let uri = format!("{RUNS}/{run_id}/discrepancies?status=closed");
    let response = get(common::build_test_app(pool), &uri, Some(token.as_str())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn resolving_records_who_and_why(pool: PgPool) {
    let run_id = completed_run_with_findings(&pool).await;
    let discrepancy_id = first_discrepancy_id(&pool, run_id).await;
    let uri = format!("/api/v1/admin/reconciliation/discrepancies/{discrepancy_id}/resolve");
    let token = token_for(9, "admin");

    let response = post_json(
        common::build_test_app(pool.clone()),
        &uri,
        Some(token.as_str()),
        json!({ "status": "resolved", "note": "  refunded manually  " }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "resolved");
    assert_eq!(json["data"]["resolved_by"], 9);
    assert_eq!(json["data"]["resolution_note"], "refunded manually");
    assert!(json["data"]["resolved_at"].is_string());

    let again = post_json(
        common::build_test_app(pool),
        &uri,
        Some(token.as_str()),
        json!({ "status": "ignored" }),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(again).await["error"],
        "Discrepancy is already resolved"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn resolve_validates_status_and_existence(pool: PgPool) {
    let run_id = completed_run_with_findings(&pool).await;
    let discrepancy_id = first_discrepancy_id(&pool, run_id).await;
    let token = admin_token();

    let response = post_json(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/admin/reconciliation/discrepancies/{discrepancy_id}/resolve"),
        Some(token.as_str()),
        json!({ "status": "open" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        common::build_test_app(pool),
        "/api/v1/admin/reconciliation/discrepancies/999999/resolve",
        Some(token.as_str()),
        json!({ "status": "resolved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
