//! Role names carried in access-token claims.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";
