//! Donation ledger, Stripe event log and reconciliation persistence.

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use sqlx::PgPool;

use benefactor_core::reconciliation::{Discrepancy, DiscrepancyKind, ReconciliationSummary};
use benefactor_db::models::donation::CreateDonation;
use benefactor_db::models::reconciliation::RunTotals;
use benefactor_db::models::status::DiscrepancyStatus;
use benefactor_db::repositories::{DonationRepo, ReconciliationRepo, StripeEventRepo};

fn donation(reference: &str, cents: i64, status: &str) -> CreateDonation {
    CreateDonation {
        contact_id: None,
        amount_cents: cents,
        currency: "USD".into(),
        donated_at: Utc.with_ymd_and_hms(2026, 6, 10, 15, 0, 0).unwrap(),
        payment_method: "card".into(),
        payment_status: status.into(),
        provider: Some("stripe".into()),
        provider_reference: Some(reference.into()),
    }
}

fn unmatched_external(txn: &str) -> Discrepancy {
    Discrepancy {
        kind: DiscrepancyKind::UnmatchedExternal,
        donation_id: None,
        transaction_id: Some(txn.into()),
        local_amount_cents: None,
        external_amount_cents: Some(1_500),
        currency: Some("USD".into()),
        local_occurred_at: None,
        external_occurred_at: Some(Utc.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).unwrap()),
        detail: "no donation recorded for processor transaction".into(),
    }
}

// ---------------------------------------------------------------------------
// Donations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn ledger_is_net_of_refunds_and_settled_only(pool: PgPool) {
    let paid = DonationRepo::create(&pool, &donation("pi_1", 5_000, "succeeded")).await.unwrap();
    DonationRepo::create(&pool, &donation("pi_2", 2_000, "pending")).await.unwrap();
    let event_at = Utc::now();
    assert!(DonationRepo::apply_refund(&pool, paid.id, event_at, 1_000).await.unwrap());

    let start = Utc.with_ymd_and_hms(2026, 6, 10, 0, 0, 0).unwrap();
    let ledger = DonationRepo::ledger_for_range(&pool, "stripe", start, start + Duration::days(1))
        .await
        .unwrap();

    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].net_amount_cents, 4_000);
    assert_eq!(ledger[0].currency, "usd");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn older_processor_events_are_ignored(pool: PgPool) {
    let d = DonationRepo::create(&pool, &donation("pi_1", 5_000, "pending")).await.unwrap();
    let t1 = Utc.with_ymd_and_hms(2026, 6, 10, 15, 0, 0).unwrap();
    let t0 = t1 - Duration::minutes(1);

    assert!(DonationRepo::mark_succeeded(&pool, d.id, t1, 5_000, "usd", "stripe", "pi_1")
        .await
        .unwrap());
    // A failure notice from an earlier attempt arrives late.
    assert!(!DonationRepo::mark_failed(&pool, d.id, t0, Some("card_declined")).await.unwrap());

    assert!(DonationRepo::apply_refund(&pool, d.id, t1 + Duration::hours(1), 5_000)
        .await
        .unwrap());
    let row = DonationRepo::find_by_id(&pool, d.id).await.unwrap().unwrap();
    assert_eq!(row.payment_status, "refunded");
    assert_eq!(row.refunded_cents, 5_000);

    // The success event redelivered after the refund cannot undo it.
    assert!(!DonationRepo::mark_succeeded(&pool, d.id, t1, 5_000, "usd", "stripe", "pi_1")
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// Stripe event log
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn stripe_event_begin_is_idempotent_until_failure(pool: PgPool) {
    let created = Utc::now();
    assert!(StripeEventRepo::begin(&pool, "evt_1", "charge.refunded", false, created, 300)
        .await
        .unwrap());
    // In flight: duplicate.
    assert!(!StripeEventRepo::begin(&pool, "evt_1", "charge.refunded", false, created, 300)
        .await
        .unwrap());

    StripeEventRepo::mark_failed(&pool, "evt_1", "db timeout").await.unwrap();
    assert!(StripeEventRepo::begin(&pool, "evt_1", "charge.refunded", false, created, 300)
        .await
        .unwrap());

    StripeEventRepo::mark_processed(&pool, "evt_1").await.unwrap();
    assert!(!StripeEventRepo::begin(&pool, "evt_1", "charge.refunded", false, created, 300)
        .await
        .unwrap());

    let row = StripeEventRepo::find_by_event_id(&pool, "evt_1").await.unwrap().unwrap();
    assert_eq!(row.status, "processed");
    assert_eq!(row.attempts, 2);
    assert_eq!(row.error, None);
}

async fn set_updated_at_trigger(pool: &PgPool, action: &str) {
    sqlx::query(&format!(
        "ALTER TABLE stripe_webhook_events {action} TRIGGER trg_stripe_webhook_events_updated_at"
    ))
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stripe_event_stuck_in_processing_is_reclaimed_after_lease(pool: PgPool) {
    let created = Utc::now();
    assert!(StripeEventRepo::begin(&pool, "evt_9", "payment_intent.succeeded", false, created, 300)
        .await
        .unwrap());

    // Handler dropped mid-flight: the row never leaves `processing`.
    set_updated_at_trigger(&pool, "DISABLE").await;
    sqlx::query(
        "UPDATE stripe_webhook_events SET updated_at = NOW() - INTERVAL '10 minutes' \
         WHERE event_id = 'evt_9'",
    )
    .execute(&pool)
    .await
    .unwrap();
    set_updated_at_trigger(&pool, "ENABLE").await;

    // Still inside a 15 minute lease: duplicate.
    assert!(!StripeEventRepo::begin(&pool, "evt_9", "payment_intent.succeeded", false, created, 900)
        .await
        .unwrap());

    // Past a 5 minute lease: claimed again.
    assert!(StripeEventRepo::begin(&pool, "evt_9", "payment_intent.succeeded", false, created, 300)
        .await
        .unwrap());
    // The reclaim refreshed `updated_at`, so the new claim is in flight.
    assert!(!StripeEventRepo::begin(&pool, "evt_9", "payment_intent.succeeded", false, created, 300)
        .await
        .unwrap());

    let row = StripeEventRepo::find_by_event_id(&pool, "evt_9").await.unwrap().unwrap();
    assert_eq!(row.status, "processing");
    assert_eq!(row.attempts, 2);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn scheduled_enqueue_is_idempotent_per_range(pool: PgPool) {
    let start = Utc.with_ymd_and_hms(2026, 6, 10, 0, 0, 0).unwrap();
    let end = start + Duration::days(1);

    let first = ReconciliationRepo::enqueue_scheduled(&pool, "stripe", start, end).await.unwrap();
    assert!(first.is_some());
    let again = ReconciliationRepo::enqueue_scheduled(&pool, "stripe", start, end).await.unwrap();
    assert!(again.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_open_manual_run_conflicts(pool: PgPool) {
    let start = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let end = start + Duration::days(30);
    ReconciliationRepo::create_run(&pool, "stripe", start, end, Some(7)).await.unwrap();

    let err = ReconciliationRepo::create_run(&pool, "stripe", start, end, Some(7))
        .await
        .unwrap_err();
    assert_matches!(err, sqlx::Error::Database(ref db)
        if db.constraint() == Some("uq_reconciliation_runs_open_range"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn completing_a_run_supersedes_overlapping_findings(pool: PgPool) {
    let day = Utc.with_ymd_and_hms(2026, 6, 10, 0, 0, 0).unwrap();

    // An earlier run over the same day left an open discrepancy.
    ReconciliationRepo::create_run(&pool, "stripe", day, day + Duration::days(1), None)
        .await
        .unwrap();
    let old = ReconciliationRepo::claim_pending(&pool, 1).await.unwrap().remove(0);
    let totals = RunTotals {
        ledger_count: 0,
        external_count: 1,
        summary: ReconciliationSummary {
            unmatched_external: 1,
            ..Default::default()
        },
    };
    assert!(ReconciliationRepo::complete_run(
        &pool,
        old.id,
        old.processing_started_at.unwrap(),
        &totals,
        &[unmatched_external("ch_1")],
    )
    .await
    .unwrap());

    // A wider run covering that day.
    ReconciliationRepo::create_run(
        &pool,
        "stripe",
        day - Duration::days(3),
        day + Duration::days(3),
        None,
    )
    .await
    .unwrap();
    let new = ReconciliationRepo::claim_pending(&pool, 1).await.unwrap().remove(0);
    assert!(ReconciliationRepo::complete_run(
        &pool,
        new.id,
        new.processing_started_at.unwrap(),
        &totals,
        &[unmatched_external("ch_1")],
    )
    .await
    .unwrap());

    let old_findings =
        ReconciliationRepo::list_discrepancies(&pool, old.id, None, 50, 0).await.unwrap();
    assert_eq!(old_findings[0].status, "superseded");

    let open = ReconciliationRepo::list_discrepancies(
        &pool,
        new.id,
        Some(DiscrepancyStatus::Open),
        50,
        0,
    )
    .await
    .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].currency.as_deref(), Some("usd"));

    let run = ReconciliationRepo::find_run(&pool, new.id).await.unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.unmatched_external_count, 1);
    assert!(run.completed_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn older_run_finishing_late_leaves_newer_findings_open(pool: PgPool) {
    let day = Utc.with_ymd_and_hms(2026, 6, 10, 0, 0, 0).unwrap();
    let totals = RunTotals::default();

    let older = ReconciliationRepo::create_run(&pool, "stripe", day, day + Duration::days(1), None)
        .await
        .unwrap();
    let newer = ReconciliationRepo::create_run(
        &pool,
        "stripe",
        day - Duration::days(1),
        day + Duration::days(2),
        None,
    )
    .await
    .unwrap();
    let claimed = ReconciliationRepo::claim_pending(&pool, 2).await.unwrap();
    assert_eq!(claimed.len(), 2);
    let claim_of = |id| {
        claimed
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.processing_started_at)
            .unwrap()
    };

    // The newer run completes first, then the older one.
    assert!(ReconciliationRepo::complete_run(
        &pool,
        newer.id,
        claim_of(newer.id),
        &totals,
        &[unmatched_external("ch_new")],
    )
    .await
    .unwrap());
    assert!(ReconciliationRepo::complete_run(
        &pool,
        older.id,
        claim_of(older.id),
        &totals,
        &[unmatched_external("ch_old")],
    )
    .await
    .unwrap());

    let newer_findings =
        ReconciliationRepo::list_discrepancies(&pool, newer.id, None, 50, 0).await.unwrap();
    assert_eq!(newer_findings.len(), 1);
    assert_eq!(newer_findings[0].status, "open");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn resolve_only_open_discrepancies(pool: PgPool) {
    let day = Utc.with_ymd_and_hms(2026, 6, 10, 0, 0, 0).unwrap();
    ReconciliationRepo::create_run(&pool, "stripe", day, day + Duration::days(1), None)
        .await
        .unwrap();
    let run = ReconciliationRepo::claim_pending(&pool, 1).await.unwrap().remove(0);
    ReconciliationRepo::complete_run(
        &pool,
        run.id,
        run.processing_started_at.unwrap(),
        &RunTotals::default(),
        &[unmatched_external("ch_9")],
    )
    .await
    .unwrap();
    let finding = ReconciliationRepo::list_discrepancies(&pool, run.id, None, 10, 0)
        .await
        .unwrap()
        .remove(0);

    let resolved = ReconciliationRepo::resolve_discrepancy(
        &pool,
        finding.id,
        DiscrepancyStatus::Ignored,
        Some("test charge"),
        42,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(resolved.status, "ignored");
    assert_eq!(resolved.resolved_by, Some(42));

    let again = ReconciliationRepo::resolve_discrepancy(
        &pool,
        finding.id,
        DiscrepancyStatus::Resolved,
        None,
        42,
    )
    .await
    .unwrap();
    assert!(again.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_run_records_error(pool: PgPool) {
    let day = Utc.with_ymd_and_hms(2026, 6, 10, 0, 0, 0).unwrap();
    ReconciliationRepo::create_run(&pool, "stripe", day, day + Duration::days(1), None)
        .await
        .unwrap();
    let run = ReconciliationRepo::claim_pending(&pool, 1).await.unwrap().remove(0);

    assert!(ReconciliationRepo::fail_run(
        &pool,
        run.id,
        run.processing_started_at.unwrap(),
        "processor unavailable"
    )
    .await
    .unwrap());
    let row = ReconciliationRepo::find_run(&pool, run.id).await.unwrap().unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.error.as_deref(), Some("processor unavailable"));
}
