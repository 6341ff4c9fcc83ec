//! Outbound webhook delivery history and manual replay.

use axum::extract::{Path, Query, State};
use axum::Json;
use benefactor_core::error::CoreError;
use benefactor_core::types::DbId;
use benefactor_db::models::webhook::WebhookDelivery;
use benefactor_db::repositories::WebhookRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/admin/webhooks/{id}/deliveries
///
/// Newest first.
pub async fn list_deliveries(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(endpoint_id): Path<DbId>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<WebhookDelivery>>>> {
    WebhookRepo::find_endpoint(&state.pool, endpoint_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "WebhookEndpoint",
            id: endpoint_id,
        }))?;

    let (limit, offset) = params.clamped();
    let deliveries = WebhookRepo::list_deliveries(&state.pool, endpoint_id, limit, offset).await?;
    Ok(Json(DataResponse { data: deliveries }))
}

/// POST /api/v1/admin/webhooks/deliveries/{id}/replay
///
/// Re-queue a delivery with a fresh attempt budget. 409 while a worker holds
/// the claim.
pub async fn replay_delivery(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WebhookDelivery>>> {
    if let Some(delivery) = WebhookRepo::replay_delivery(&state.pool, id).await? {
        tracing::info!(delivery_id = id, user_id = admin.user_id, "Webhook delivery replayed");
        return Ok(Json(DataResponse { data: delivery }));
    }

    match WebhookRepo::find_delivery(&state.pool, id).await? {
        Some(_) => Err(AppError::Core(CoreError::Conflict(
            "Delivery is being processed; try again shortly".into(),
        ))),
        None => Err(AppError::Core(CoreError::NotFound {
            entity: "WebhookDelivery",
            id,
        })),
    }
}
