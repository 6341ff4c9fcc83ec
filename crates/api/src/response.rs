//! Response envelope shared by the JSON handlers.

use serde::Serialize;

/// Standard `{ "data": T }` envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: runs }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
