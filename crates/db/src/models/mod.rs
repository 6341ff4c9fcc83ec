//! Row structs and DTOs.
//!
//! Entity structs derive `FromRow` + `Serialize` and mirror a table row.
//! `Claimed*` structs are what a work-queue claim returns: the claimed row
//! joined with whatever the job needs to process it. Create DTOs derive
//! `Deserialize`.

pub mod donation;
pub mod event_reminder;
pub mod follow_up;
pub mod reconciliation;
pub mod report_data;
pub mod scheduled_report;
pub mod status;
pub mod stripe_event;
pub mod webhook;
