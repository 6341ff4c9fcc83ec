use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use benefactor_core::error::CoreError;
use benefactor_core::roles::ROLE_ADMIN;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the `admin` role: 401 without a valid token, 403 with any
/// other role.
///
/// ```ignore
/// async fn replay(RequireAdmin(admin): RequireAdmin) -> AppResult<Json<()>> { .. }
/// ```
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != ROLE_ADMIN {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}
