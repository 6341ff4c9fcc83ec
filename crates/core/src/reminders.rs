//! Reminder rules for events and contact follow-ups.
//!
//! Channel selection, skip conditions and message text live here so the
//! worker only deals with fetching rows and calling delivery channels.

use chrono::Duration;

use crate::types::Timestamp;

/// Maximum SMS body length (two concatenated segments).
pub const MAX_SMS_CHARS: usize = 320;

/// Event status value for a cancelled event.
pub const EVENT_STATUS_CANCELLED: &str = "cancelled";

/// Follow-up status value for an open follow-up.
pub const FOLLOW_UP_STATUS_OPEN: &str = "open";

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Which channels an event reminder goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderChannel {
    Email,
    Sms,
    Both,
}

impl ReminderChannel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Both => "both",
        }
    }

    pub fn wants_email(self) -> bool {
        matches!(self, Self::Email | Self::Both)
    }

    pub fn wants_sms(self) -> bool {
        matches!(self, Self::Sms | Self::Both)
    }
}

// ---------------------------------------------------------------------------
// Event reminders
// ---------------------------------------------------------------------------

/// Reason an event reminder should not be sent, if any.
pub fn event_reminder_skip_reason(
    event_status: &str,
    starts_at: Timestamp,
    now: Timestamp,
) -> Option<&'static str> {
    if event_status == EVENT_STATUS_CANCELLED {
        Some("event cancelled")
    } else if starts_at <= now {
        Some("event already started")
    } else {
        None
    }
}

/// Human-readable event time, always in UTC.
pub fn format_event_time(at: Timestamp) -> String {
    at.format("%A, %B %-d, %Y at %H:%M UTC").to_string()
}

pub fn event_reminder_subject(event_name: &str) -> String {
    format!("Reminder: {event_name}")
}

pub fn event_reminder_email_body(
    first_name: Option<&str>,
    event_name: &str,
    starts_at: Timestamp,
    location: Option<&str>,
) -> String {
    let greeting = match first_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hi {name},"),
        None => "Hello,".to_string(),
    };
    let mut body = format!(
        "{greeting}\n\nThis is a reminder that {event_name} starts on {}.",
        format_event_time(starts_at)
    );
    if let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) {
        body.push_str(&format!("\nLocation: {location}"));
    }
    body.push_str("\n\nWe look forward to seeing you there.");
    body
}

pub fn event_reminder_sms_body(
    event_name: &str,
    starts_at: Timestamp,
    location: Option<&str>,
) -> String {
    let mut body = format!("Reminder: {event_name} on {}", format_event_time(starts_at));
    if let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) {
        body.push_str(&format!(" at {location}"));
    }
    body.push_str(". Reply STOP to opt out.");
    truncate_chars(&body, MAX_SMS_CHARS)
}

/// Truncate on a character boundary, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// Follow-up reminders
// ---------------------------------------------------------------------------

/// When the reminder for a follow-up becomes due.
pub fn follow_up_reminder_at(due_at: Timestamp, lead_minutes: i32) -> Timestamp {
    due_at - Duration::minutes(i64::from(lead_minutes.max(0)))
}

/// Reason a follow-up reminder should not be sent, if any.
pub fn follow_up_skip_reason(status: &str, assignee_email: Option<&str>) -> Option<&'static str> {
    if status != FOLLOW_UP_STATUS_OPEN {
        Some("follow-up no longer open")
    } else if assignee_email.map(str::trim).is_none_or(str::is_empty) {
        Some("assignee has no email address")
    } else {
        None
    }
}

pub fn follow_up_subject(subject: &str) -> String {
    format!("Follow-up due: {subject}")
}

pub fn follow_up_email_body(
    assignee_name: Option<&str>,
    contact_name: &str,
    subject: &str,
    due_at: Timestamp,
    notes: Option<&str>,
) -> String {
    let greeting = match assignee_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hi {name},"),
        None => "Hello,".to_string(),
    };
    let mut body = format!(
        "{greeting}\n\nYour follow-up with {contact_name} (\"{subject}\") is due {}.",
        format_event_time(due_at)
    );
    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        body.push_str(&format!("\n\nNotes:\n{notes}"));
    }
    body
}
