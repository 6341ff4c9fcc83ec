//! Route definitions for `/admin`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{reconciliation, scheduled_reports, webhooks};
use crate::state::AppState;

/// Routes mounted at `/admin`. Every handler takes `RequireAdmin`.
///
/// ```text
/// POST /reconciliation/runs                          -> create_run
/// GET  /reconciliation/runs                          -> list_runs
/// GET  /reconciliation/runs/{id}                     -> get_run
/// GET  /reconciliation/runs/{id}/discrepancies       -> list_discrepancies
/// POST /reconciliation/discrepancies/{id}/resolve    -> resolve_discrepancy
/// GET  /webhooks/{id}/deliveries                     -> list_deliveries
/// POST /webhooks/deliveries/{id}/replay              -> replay_delivery
/// POST /scheduled-reports/{id}/run-now               -> run_now
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/reconciliation/runs",
            get(reconciliation::list_runs).post(reconciliation::create_run),
        )
        .route("/reconciliation/runs/{id}", get(reconciliation::get_run))
        .route(
            "/reconciliation/runs/{id}/discrepancies",
            get(reconciliation::list_discrepancies),
        )
        .route(
            "/reconciliation/discrepancies/{id}/resolve",
            post(reconciliation::resolve_discrepancy),
        )
        .route("/webhooks/{id}/deliveries", get(webhooks::list_deliveries))
        .route(
            "/webhooks/deliveries/{id}/replay",
            post(webhooks::replay_delivery),
        )
        .route(
            "/scheduled-reports/{id}/run-now",
            post(scheduled_reports::run_now),
        )
}
