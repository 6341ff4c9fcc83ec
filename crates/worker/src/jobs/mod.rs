//! The claim-and-mark pollers.

pub mod event_reminders;
pub mod follow_ups;
pub mod reconciliation;
pub mod scheduled_reports;
pub mod webhook_retries;

use std::sync::Arc;
use std::time::Duration;

use benefactor_core::batch::{run_claimed_batch, ClaimAndMark};
use benefactor_core::batch_runner::IntervalBatchRunner;
use benefactor_notify::{EmailSender, SmsSender};

pub use event_reminders::EventReminderJob;
pub use follow_ups::FollowUpJob;
pub use reconciliation::{ReconciliationJob, ReconciliationScheduler};
pub use scheduled_reports::ScheduledReportJob;
pub use webhook_retries::WebhookRetryJob;

/// Outbound channels available to the reminder and report jobs. A channel
/// is `None` when its provider is not configured.
#[derive(Clone, Default)]
pub struct Channels {
    pub email: Option<Arc<dyn EmailSender>>,
    pub sms: Option<Arc<dyn SmsSender>>,
}

/// Wrap a job in a runner whose batch is one claim/process/record cycle.
pub fn runner_for<W>(job: Arc<W>, interval: Duration) -> IntervalBatchRunner
where
    W: ClaimAndMark + 'static,
{
    let name = job.name();
    IntervalBatchRunner::new(name, interval, move || {
        let job = Arc::clone(&job);
        async move {
            let report = run_claimed_batch(&*job).await?;
            Ok(report.claimed)
        }
    })
}

/// Counts are stored as INTEGER.
pub(crate) fn as_count(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
