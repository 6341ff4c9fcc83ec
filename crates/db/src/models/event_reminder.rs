//! Event reminder queue rows.

use benefactor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `event_reminders` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventReminder {
    pub id: DbId,
    pub event_id: DbId,
    pub channel: String,
    pub send_at: Timestamp,
    pub custom_message: Option<String>,
    pub status: String,
    pub processing_started_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    pub attempted_count: i32,
    pub succeeded_count: i32,
    pub last_error: Option<String>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A claimed reminder joined with its event.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedEventReminder {
    pub id: DbId,
    pub event_id: DbId,
    pub channel: String,
    pub custom_message: Option<String>,
    /// Claim token; required to record the outcome.
    pub processing_started_at: Timestamp,
    pub event_name: String,
    pub event_starts_at: Timestamp,
    pub event_location: Option<String>,
    pub event_status: String,
}

/// A registered contact for an event.
#[derive(Debug, Clone, FromRow)]
pub struct ReminderRecipient {
    pub contact_id: DbId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub email_opt_out: bool,
    pub sms_opt_in: bool,
}

impl ReminderRecipient {
    /// Email address if the contact can be emailed.
    pub fn reachable_email(&self) -> Option<&str> {
        if self.email_opt_out {
            return None;
        }
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// Phone number if the contact opted in to SMS.
    pub fn reachable_phone(&self) -> Option<&str> {
        if !self.sms_opt_in {
            return None;
        }
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// DTO for scheduling a reminder.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventReminder {
    pub event_id: DbId,
    pub channel: String,
    pub send_at: Timestamp,
    pub custom_message: Option<String>,
    pub created_by: Option<DbId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> ReminderRecipient {
        ReminderRecipient {
            contact_id: 1,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: Some(" ada@example.org ".into()),
            phone: Some("+15550100".into()),
            email_opt_out: false,
            sms_opt_in: true,
        }
    }

    #[test]
    fn reachable_channels_respect_preferences() {
        let r = recipient();
        assert_eq!(r.reachable_email(), Some("ada@example.org"));
        assert_eq!(r.reachable_phone(), Some("+15550100"));

        let opted_out = ReminderRecipient {
            email_opt_out: true,
            sms_opt_in: false,
            ..recipient()
        };
        assert_eq!(opted_out.reachable_email(), None);
        assert_eq!(opted_out.reachable_phone(), None);
    }

    #[test]
    fn blank_addresses_are_unreachable() {
        let r = ReminderRecipient {
            email: Some("   ".into()),
            phone: None,
            ..recipient()
        };
        assert_eq!(r.reachable_email(), None);
        assert_eq!(r.reachable_phone(), None);
    }
}
