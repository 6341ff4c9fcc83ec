use axum::extract::{Path, State};
use axum::Json;
use benefactor_core::error::CoreError;
use benefactor_core::types::DbId;
use benefactor_db::models::scheduled_report::ScheduledReport;
use benefactor_db::repositories::ScheduledReportRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/admin/scheduled-reports/{id}/run-now
///
/// Makes the schedule due immediately; the worker picks it up on its next
/// tick. Inactive schedules are refused with 409.
pub async fn run_now(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ScheduledReport>>> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "ScheduledReport",
            id,
        })
    };

    let report = ScheduledReportRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(not_found)?;
    if !report.is_active {
        return Err(AppError::Core(CoreError::Conflict(
            "Scheduled report is inactive".into(),
        )));
    }

    let report = ScheduledReportRepo::run_now(&state.pool, id)
        .await?
        .ok_or_else(not_found)?;
    tracing::info!(report_id = id, user_id = admin.user_id, "Scheduled report queued to run now");
    Ok(Json(DataResponse { data: report }))
}
