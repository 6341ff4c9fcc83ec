//! Domain building blocks shared by the Benefactor API server and worker.
//!
//! Nothing in this crate touches the database or the network. It holds the
//! scheduling primitives, the claim-and-mark batch driver, and the pure
//! decision logic (retry policy, reminder and report scheduling,
//! reconciliation) so both binaries agree on the rules.

pub mod batch;
pub mod batch_runner;
pub mod error;
pub mod pagination;
pub mod reconciliation;
pub mod reminders;
pub mod report_export;
pub mod report_schedule;
pub mod retry;
pub mod roles;
pub mod types;
