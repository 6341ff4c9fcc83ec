//! Reconciliation review: queue runs, inspect results, close findings.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use benefactor_core::error::CoreError;
use benefactor_core::types::DbId;
use benefactor_db::models::reconciliation::{
    CreateReconciliationRun, ReconciliationDiscrepancy, ReconciliationRun,
};
use benefactor_db::models::status::DiscrepancyStatus;
use benefactor_db::repositories::ReconciliationRepo;
use benefactor_payments::PROVIDER_STRIPE;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DiscrepancyQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDiscrepancy {
    /// `resolved` or `ignored`.
    pub status: String,
    pub note: Option<String>,
}

/// POST /api/v1/admin/reconciliation/runs
///
/// Queue a manual run. 409 while another open run covers the same range.
pub async fn create_run(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateReconciliationRun>,
) -> AppResult<(StatusCode, Json<DataResponse<ReconciliationRun>>)> {
    if input.range_start >= input.range_end {
        return Err(AppError::Core(CoreError::Validation(
            "range_start must be before range_end".into(),
        )));
    }
    let provider = input.provider.as_deref().unwrap_or(PROVIDER_STRIPE);
    if provider != PROVIDER_STRIPE {
        return Err(AppError::Core(CoreError::Validation(format!(
            "unsupported provider '{provider}'"
        ))));
    }

    let run = ReconciliationRepo::create_run(
        &state.pool,
        provider,
        input.range_start,
        input.range_end,
        Some(admin.user_id),
    )
    .await?;

    tracing::info!(run_id = run.id, user_id = admin.user_id, "Reconciliation run requested");
    Ok((StatusCode::CREATED, Json(DataResponse { data: run })))
}

/// GET /api/v1/admin/reconciliation/runs
pub async fn list_runs(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<ReconciliationRun>>>> {
    let (limit, offset) = params.clamped();
    let runs = ReconciliationRepo::list_runs(&state.pool, limit, offset).await?;
    Ok(Json(DataResponse { data: runs }))
}

/// GET /api/v1/admin/reconciliation/runs/{id}
pub async fn get_run(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ReconciliationRun>>> {
    let run = find_run(&state, id).await?;
    Ok(Json(DataResponse { data: run }))
}

/// GET /api/v1/admin/reconciliation/runs/{id}/discrepancies
pub async fn list_discrepancies(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<DiscrepancyQuery>,
) -> AppResult<Json<DataResponse<Vec<ReconciliationDiscrepancy>>>> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            DiscrepancyStatus::parse(s).ok_or_else(|| {
                AppError::Core(CoreError::Validation(format!(
                    "unknown discrepancy status '{s}'"
                )))
            })
        })
        .transpose()?;
    find_run(&state, id).await?;

    let (limit, offset) = PaginationParams {
        limit: params.limit,
        offset: params.offset,
    }
    .clamped();
    let items =
        ReconciliationRepo::list_discrepancies(&state.pool, id, status, limit, offset).await?;
    Ok(Json(DataResponse { data: items }))
}

/// POST /api/v1/admin/reconciliation/discrepancies/{id}/resolve
///
/// Close an open discrepancy. 409 when it was already closed.
pub async fn resolve_discrepancy(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ResolveDiscrepancy>,
) -> AppResult<Json<DataResponse<ReconciliationDiscrepancy>>> {
    let status = match DiscrepancyStatus::parse(&input.status) {
        Some(s @ (DiscrepancyStatus::Resolved | DiscrepancyStatus::Ignored)) => s,
        _ => {
            return Err(AppError::Core(CoreError::Validation(
                "status must be 'resolved' or 'ignored'".into(),
            )))
        }
    };
    let note = input.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let resolved =
        ReconciliationRepo::resolve_discrepancy(&state.pool, id, status, note, admin.user_id)
            .await?;
    match resolved {
        Some(discrepancy) => {
            tracing::info!(
                discrepancy_id = id,
                status = %status,
                user_id = admin.user_id,
                "Discrepancy closed",
            );
            Ok(Json(DataResponse { data: discrepancy }))
        }
        None => match ReconciliationRepo::find_discrepancy(&state.pool, id).await? {
            Some(existing) => Err(AppError::Core(CoreError::Conflict(format!(
                "Discrepancy is already {}",
                existing.status
            )))),
            None => Err(AppError::Core(CoreError::NotFound {
                entity: "ReconciliationDiscrepancy",
                id,
            })),
        },
    }
}

async fn find_run(state: &AppState, id: DbId) -> AppResult<ReconciliationRun> {
    ReconciliationRepo::find_run(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "ReconciliationRun",
            id,
        }))
}
