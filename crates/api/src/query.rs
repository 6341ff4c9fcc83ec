//! Query parameter types shared by list endpoints.

use benefactor_core::pagination::{clamp_limit, clamp_offset, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use serde::Deserialize;

/// `?limit=&offset=`.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    /// `(limit, offset)` clamped to the allowed page size.
    pub fn clamped(&self) -> (i64, i64) {
        (
            clamp_limit(self.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT),
            clamp_offset(self.offset),
        )
    }
}
