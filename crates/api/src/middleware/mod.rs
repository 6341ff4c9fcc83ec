//! Request extractors for authentication and authorization.
//!
//! - [`auth::AuthUser`] -- the caller identified by a Bearer token.
//! - [`rbac::RequireAdmin`] -- same, but only for the `admin` role.

pub mod auth;
pub mod rbac;
