//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod donation_repo;
pub mod event_reminder_repo;
pub mod follow_up_repo;
pub mod reconciliation_repo;
pub mod report_data_repo;
pub mod scheduled_report_repo;
pub mod stripe_event_repo;
pub mod webhook_repo;

pub use donation_repo::DonationRepo;
pub use event_reminder_repo::EventReminderRepo;
pub use follow_up_repo::FollowUpRepo;
pub use reconciliation_repo::ReconciliationRepo;
pub use report_data_repo::ReportDataRepo;
pub use scheduled_report_repo::ScheduledReportRepo;
pub use stripe_event_repo::StripeEventRepo;
pub use webhook_repo::WebhookRepo;
