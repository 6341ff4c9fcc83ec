//! Scheduled report delivery: render, attach, email every recipient, log
//! the run and move `next_run_at` forward.

use async_trait::async_trait;
use benefactor_core::batch::{ClaimAndMark, DeliveryTally, Disposition, WorkItem};
use benefactor_core::report_export::{attachment_filename, export};
use benefactor_core::report_schedule::{next_run_after, ReportFormat, ReportFrequency, ReportKind};
use benefactor_core::types::{DbId, Timestamp};
use benefactor_db::models::scheduled_report::{NewReportRun, ScheduledReport};
use benefactor_db::repositories::ScheduledReportRepo;
use benefactor_notify::{EmailAttachment, EmailMessage};
use chrono::Utc;
use sqlx::PgPool;

use super::{as_count, Channels};

/// The claimed schedule plus the number of rows its report rendered.
pub type ReportItem = WorkItem<ScheduledReport, usize>;

pub struct ScheduledReportJob {
    pool: PgPool,
    channels: Channels,
    batch_size: i64,
    lease_secs: i64,
}

/// A schedule row with its text columns parsed.
#[derive(Debug, Clone, Copy)]
struct ReportPlan {
    kind: ReportKind,
    format: ReportFormat,
    frequency: ReportFrequency,
}

impl ReportPlan {
    fn parse(report: &ScheduledReport) -> Result<Self, String> {
        Ok(Self {
            kind: ReportKind::parse(&report.report_type)
                .ok_or_else(|| format!("unknown report type '{}'", report.report_type))?,
            format: ReportFormat::parse(&report.format)
                .ok_or_else(|| format!("unknown report format '{}'", report.format))?,
            frequency: ReportFrequency::parse(&report.frequency)
                .ok_or_else(|| format!("unknown frequency '{}'", report.frequency))?,
        })
    }
}

/// Recipients with surrounding whitespace removed, blanks and duplicates
/// dropped, original order kept.
pub fn clean_recipients(recipients: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for r in recipients.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(r)) {
            out.push(r.to_string());
        }
    }
    out
}

/// When the schedule runs next. A frequency that no longer parses falls
/// back to daily so a broken row cannot be claimed in a tight loop.
pub fn following_run(report: &ScheduledReport, now: Timestamp) -> Timestamp {
    let frequency = ReportFrequency::parse(&report.frequency).unwrap_or(ReportFrequency::Daily);
    next_run_after(frequency, report.next_run_at, now)
}

impl ScheduledReportJob {
    pub fn new(pool: PgPool, channels: Channels, batch_size: i64, lease_secs: i64) -> Self {
        Self {
            pool,
            channels,
            batch_size,
            lease_secs,
        }
    }

    async fn deliver(&self, item: &ReportItem, plan: ReportPlan) -> anyhow::Result<Disposition> {
        let report = &item.row;
        let (start, end) = plan.frequency.period_ending(report.next_run_at);

        let table = crate::reports::render(&self.pool, plan.kind, start, end).await?;
        item.set_computed(table.row_count());
        let bytes = export(&table, plan.format)?;

        let Some(sender) = self.channels.email.as_ref() else {
            return Ok(Disposition::skipped("email channel not configured"));
        };
        let recipients = clean_recipients(&report.recipients);
        if recipients.is_empty() {
            return Ok(Disposition::skipped("no recipients"));
        }

        let attachment = EmailAttachment {
            filename: attachment_filename(plan.kind.as_str(), end, plan.format),
            content_type: plan.format.content_type().to_string(),
            data: bytes,
        };
        let subject = format!("{} ({})", report.name, plan.kind.title());
        let body = format!(
            "Attached is the {} report for {} to {}.\n\nRows: {}",
            plan.kind.title().to_lowercase(),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            table.row_count(),
        );

        let mut tally = DeliveryTally::default();
        let mut last_error = None;
        for to in &recipients {
            let message = EmailMessage::new(to.as_str(), subject.as_str(), body.as_str())
                .with_attachment(attachment.clone());
            match sender.send(&message).await {
                Ok(()) => tally.record_success(),
                Err(e) => {
                    tracing::warn!(
                        report_id = report.id,
                        to = %to,
                        error = %e,
                        "Report email failed",
                    );
                    tally.record_failure();
                    last_error = Some(e.to_string());
                }
            }
        }
        Ok(Disposition::from_tally(tally, last_error))
    }
}

#[async_trait]
impl ClaimAndMark for ScheduledReportJob {
    type Item = ReportItem;

    fn name(&self) -> &'static str {
        "scheduled_reports"
    }

    fn item_id(&self, item: &ReportItem) -> DbId {
        item.row.id
    }

    async fn release_stale(&self) -> anyhow::Result<u64> {
        Ok(ScheduledReportRepo::release_stale(&self.pool, self.lease_secs).await?)
    }

    async fn claim(&self) -> anyhow::Result<Vec<ReportItem>> {
        let rows = ScheduledReportRepo::claim_due(&self.pool, self.batch_size).await?;
        Ok(rows.into_iter().map(WorkItem::new).collect())
    }

    async fn process(&self, item: &ReportItem) -> anyhow::Result<Disposition> {
        match ReportPlan::parse(&item.row) {
            Ok(plan) => self.deliver(item, plan).await,
            Err(reason) => Ok(Disposition::failed(reason)),
        }
    }

    async fn record(&self, item: &ReportItem, disposition: &Disposition) -> anyhow::Result<bool> {
        let report = &item.row;
        let Some(claimed_at) = report.processing_started_at else {
            return Ok(false);
        };

        let frequency = ReportFrequency::parse(&report.frequency).unwrap_or(ReportFrequency::Daily);
        let (period_start, period_end) = frequency.period_ending(report.next_run_at);
        let next_run_at = following_run(report, Utc::now());

        let run = NewReportRun {
            period_start,
            period_end,
            status: disposition.outcome.as_str().to_string(),
            row_count: item
                .computed()
                .map(|n| i32::try_from(*n).unwrap_or(i32::MAX))
                .unwrap_or(0),
            recipients_attempted: as_count(disposition.tally.attempted),
            recipients_succeeded: as_count(disposition.tally.succeeded),
            error: disposition.detail.clone(),
            started_at: claimed_at,
        };

        tracing::debug!(
            report_id = report.id,
            next_run_at = %next_run_at,
            "Scheduled report advanced",
        );
        let recorded =
            ScheduledReportRepo::complete_run(&self.pool, report.id, claimed_at, next_run_at, &run)
                .await?;
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn report(frequency: &str, next_run_at: Timestamp) -> ScheduledReport {
        ScheduledReport {
            id: 1,
            name: "Weekly gifts".into(),
            report_type: "donation_summary".into(),
            format: "csv".into(),
            frequency: frequency.into(),
            recipients: vec![],
            next_run_at,
            is_active: true,
            status: "processing".into(),
            processing_started_at: Some(next_run_at),
            last_run_at: None,
            last_status: None,
            last_error: None,
            created_by: None,
            created_at: next_run_at,
            updated_at: next_run_at,
        }
    }

    #[test]
    fn recipients_are_trimmed_and_deduplicated() {
        let cleaned = clean_recipients(&[
            " a@example.org".into(),
            "".into(),
            "A@example.org".into(),
            "b@example.org ".into(),
        ]);
        assert_eq!(cleaned, vec!["a@example.org", "b@example.org"]);
    }

    #[test]
    fn next_run_skips_missed_periods() {
        let scheduled = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let now = scheduled + Duration::days(15);
        let next = following_run(&report("weekly", scheduled), now);
        assert_eq!(next, scheduled + Duration::weeks(3));
    }

    #[test]
    fn unknown_frequency_advances_daily() {
        let scheduled = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let next = following_run(&report("hourly", scheduled), scheduled);
        assert_eq!(next, scheduled + Duration::days(1));
    }

    #[test]
    fn plan_rejects_unknown_values() {
        let scheduled = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let mut row = report("monthly", scheduled);
        row.format = "xlsx".into();
        let err = ReportPlan::parse(&row).unwrap_err();
        assert_eq!(err, "unknown report format 'xlsx'");
    }
}
