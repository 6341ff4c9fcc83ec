use axum::routing::post;
use axum::Router;

use crate::handlers::stripe_webhook;
use crate::state::AppState;

/// Routes mounted at `/payments`. Authenticated by signature, not JWT.
///
/// ```text
/// POST /stripe/webhook -> receive
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/stripe/webhook", post(stripe_webhook::receive))
}
