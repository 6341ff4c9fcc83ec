pub mod admin;
pub mod health;
pub mod payments;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /payments/stripe/webhook                          Stripe events (signature)
/// /admin/reconciliation/...                         reconciliation review (admin)
/// /admin/webhooks/...                               delivery history, replay (admin)
/// /admin/scheduled-reports/{id}/run-now             queue a report now (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/payments", payments::router())
        .nest("/admin", admin::router())
}
