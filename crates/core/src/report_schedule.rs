//! Scheduled report cadence, formats and kinds.

use chrono::{Duration, Months};

use crate::types::Timestamp;

/// How often a scheduled report is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl ReportFrequency {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// One period after `from`. Month steps clamp to the last valid day.
    pub fn step(self, from: Timestamp) -> Timestamp {
        match self {
            Self::Daily => from + Duration::days(1),
            Self::Weekly => from + Duration::weeks(1),
            Self::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or(from + Duration::days(30)),
        }
    }

    /// The reporting window `[start, end)` that ends at `end`.
    pub fn period_ending(self, end: Timestamp) -> (Timestamp, Timestamp) {
        let start = match self {
            Self::Daily => end - Duration::days(1),
            Self::Weekly => end - Duration::weeks(1),
            Self::Monthly => end
                .checked_sub_months(Months::new(1))
                .unwrap_or(end - Duration::days(30)),
        };
        (start, end)
    }
}

/// First run time strictly after `now`, advancing from the previously
/// scheduled time. Missed periods are skipped rather than replayed.
pub fn next_run_after(
    frequency: ReportFrequency,
    scheduled_at: Timestamp,
    now: Timestamp,
) -> Timestamp {
    let mut next = frequency.step(scheduled_at);
    while next <= now {
        next = frequency.step(next);
    }
    next
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Built-in report definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    DonationSummary,
    DonationDetail,
    NewContacts,
    EventAttendance,
}

impl ReportKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "donation_summary" => Some(Self::DonationSummary),
            "donation_detail" => Some(Self::DonationDetail),
            "new_contacts" => Some(Self::NewContacts),
            "event_attendance" => Some(Self::EventAttendance),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DonationSummary => "donation_summary",
            Self::DonationDetail => "donation_detail",
            Self::NewContacts => "new_contacts",
            Self::EventAttendance => "event_attendance",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::DonationSummary => "Donation summary",
            Self::DonationDetail => "Donation detail",
            Self::NewContacts => "New contacts",
            Self::EventAttendance => "Event attendance",
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 6, 0, 0).unwrap()
    }

    #[test]
    fn daily_advances_one_day_when_on_time() {
        let scheduled = ymd(2026, 5, 1);
        let now = scheduled + Duration::minutes(3);
        assert_eq!(next_run_after(ReportFrequency::Daily, scheduled, now), ymd(2026, 5, 2));
    }

    #[test]
    fn missed_periods_are_skipped() {
        let scheduled = ymd(2026, 5, 1);
        let now = ymd(2026, 5, 4) + Duration::hours(1);
        assert_eq!(next_run_after(ReportFrequency::Daily, scheduled, now), ymd(2026, 5, 5));
        assert_eq!(next_run_after(ReportFrequency::Weekly, scheduled, now), ymd(2026, 5, 8));
    }

    #[test]
    fn monthly_clamps_to_month_end() {
        assert_eq!(ReportFrequency::Monthly.step(ymd(2026, 1, 31)), ymd(2026, 2, 28));
        assert_eq!(
            next_run_after(ReportFrequency::Monthly, ymd(2026, 1, 15), ymd(2026, 1, 15)),
            ymd(2026, 2, 15)
        );
    }

    #[test]
    fn period_windows() {
        let end = ymd(2026, 3, 1);
        assert_eq!(ReportFrequency::Daily.period_ending(end), (ymd(2026, 2, 28), end));
        assert_eq!(ReportFrequency::Weekly.period_ending(end), (ymd(2026, 2, 22), end));
        assert_eq!(ReportFrequency::Monthly.period_ending(end), (ymd(2026, 2, 1), end));
    }

    #[test]
    fn parsing_round_trips() {
        for f in [ReportFrequency::Daily, ReportFrequency::Weekly, ReportFrequency::Monthly] {
            assert_eq!(ReportFrequency::parse(f.as_str()), Some(f));
        }
        for k in [
            ReportKind::DonationSummary,
            ReportKind::DonationDetail,
            ReportKind::NewContacts,
            ReportKind::EventAttendance,
        ] {
            assert_eq!(ReportKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(ReportFormat::parse("xlsx"), None);
        assert_eq!(ReportFormat::Csv.content_type(), "text/csv");
    }
}
