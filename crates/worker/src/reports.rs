//! Renders the built-in report kinds into a [`ReportTable`].

use benefactor_core::report_export::ReportTable;
use benefactor_core::report_schedule::ReportKind;
use benefactor_core::types::Timestamp;
use benefactor_db::models::report_data::{
    DonationDayTotal, DonationDetailRow, EventAttendanceRow, NewContactRow,
};
use benefactor_db::repositories::ReportDataRepo;
use sqlx::PgPool;

/// Load and render one report for the window `[start, end)`.
pub async fn render(
    pool: &PgPool,
    kind: ReportKind,
    start: Timestamp,
    end: Timestamp,
) -> Result<ReportTable, sqlx::Error> {
    Ok(match kind {
        ReportKind::DonationSummary => {
            donation_summary(&ReportDataRepo::donation_day_totals(pool, start, end).await?)
        }
        ReportKind::DonationDetail => {
            donation_detail(&ReportDataRepo::donation_details(pool, start, end).await?)
        }
        ReportKind::NewContacts => {
            new_contacts(&ReportDataRepo::new_contacts(pool, start, end).await?)
        }
        ReportKind::EventAttendance => {
            event_attendance(&ReportDataRepo::event_attendance(pool, start, end).await?)
        }
    })
}

/// `12345` -> `"123.45"`, `-5` -> `"-0.05"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn format_time(at: Timestamp) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn donation_summary(rows: &[DonationDayTotal]) -> ReportTable {
    let mut table = ReportTable::new(&["day", "currency", "donations", "net_amount"]);
    for row in rows {
        table.push_row(vec![
            row.day.format("%Y-%m-%d").to_string(),
            row.currency.to_uppercase(),
            row.donation_count.to_string(),
            format_cents(row.net_cents),
        ]);
    }
    table
}

pub fn donation_detail(rows: &[DonationDetailRow]) -> ReportTable {
    let mut table = ReportTable::new(&[
        "donation_id",
        "donated_at",
        "donor",
        "amount",
        "refunded",
        "currency",
        "payment_method",
        "payment_status",
        "reference",
    ]);
    for row in rows {
        table.push_row(vec![
            row.id.to_string(),
            format_time(row.donated_at),
            row.donor_name.clone().unwrap_or_else(|| "Anonymous".to_string()),
            format_cents(row.amount_cents),
            format_cents(row.refunded_cents),
            row.currency.to_uppercase(),
            row.payment_method.clone(),
            row.payment_status.clone(),
            row.provider_reference.clone().unwrap_or_default(),
        ]);
    }
    table
}

pub fn new_contacts(rows: &[NewContactRow]) -> ReportTable {
    let mut table = ReportTable::new(&[
        "contact_id",
        "first_name",
        "last_name",
        "email",
        "phone",
        "created_at",
    ]);
    for row in rows {
        table.push_row(vec![
            row.id.to_string(),
            row.first_name.clone(),
            row.last_name.clone(),
            row.email.clone().unwrap_or_default(),
            row.phone.clone().unwrap_or_default(),
            format_time(row.created_at),
        ]);
    }
    table
}

pub fn event_attendance(rows: &[EventAttendanceRow]) -> ReportTable {
    let mut table = ReportTable::new(&[
        "event_id",
        "event",
        "starts_at",
        "status",
        "registered",
        "attended",
        "no_show",
        "cancelled",
        "attendance_rate",
    ]);
    for row in rows {
        let rate = if row.registered > 0 {
            format!("{:.1}%", row.attended as f64 * 100.0 / row.registered as f64)
        } else {
            String::new()
        };
        table.push_row(vec![
            row.event_id.to_string(),
            row.name.clone(),
            format_time(row.starts_at),
            row.status.clone(),
            row.registered.to_string(),
            row.attended.to_string(),
            row.no_show.to_string(),
            row.cancelled.to_string(),
            rate,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    #[test]
    fn cents_formatting() {
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(123_456), "1234.56");
        assert_eq!(format_cents(-250), "-2.50");
    }

    #[test]
    fn summary_rows() {
        let table = donation_summary(&[DonationDayTotal {
            day: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            currency: "usd".into(),
            donation_count: 3,
            net_cents: 15_000,
        }]);
        assert_eq!(table.columns, vec!["day", "currency", "donations", "net_amount"]);
        assert_eq!(table.rows[0], vec!["2026-05-01", "USD", "3", "150.00"]);
    }

    #[test]
    fn attendance_rate_is_blank_without_registrations() {
        let starts_at = Utc.with_ymd_and_hms(2026, 5, 2, 18, 0, 0).unwrap();
        let row = |registered, attended| EventAttendanceRow {
            event_id: 1,
            name: "Gala".into(),
            starts_at,
            status: "completed".into(),
            registered,
            attended,
            no_show: 0,
            cancelled: 0,
        };
        let table = event_attendance(&[row(4, 3), row(0, 0)]);
        assert_eq!(table.rows[0][8], "75.0%");
        assert_eq!(table.rows[1][8], "");
        assert_eq!(table.rows[0][2], "2026-05-02 18:00:00");
    }

    #[test]
    fn anonymous_donor() {
        let table = donation_detail(&[DonationDetailRow {
            id: 8,
            donated_at: Utc.with_ymd_and_hms(2026, 5, 1, 9, 30, 0).unwrap(),
            donor_name: None,
            amount_cents: 2_500,
            refunded_cents: 500,
            currency: "eur".into(),
            payment_method: "card".into(),
            payment_status: "succeeded".into(),
            provider_reference: Some("pi_1".into()),
        }]);
        assert_eq!(
            table.rows[0],
            vec![
                "8",
                "2026-05-01 09:30:00",
                "Anonymous",
                "25.00",
                "5.00",
                "EUR",
                "card",
                "succeeded",
                "pi_1",
            ]
        );
    }
}
