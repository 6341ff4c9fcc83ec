//! Status enums for the TEXT status columns.
//!
//! Each variant's string matches the column's CHECK constraint in the
//! migrations; repositories bind `as_str()` rather than string literals.

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $val)] $variant ),+
        }

        impl $name {
            /// Value stored in the database.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $val ),+
                }
            }

            /// Parse a stored value.
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// `event_reminders.status`.
    EventReminderStatus {
        Pending = "pending",
        Processing = "processing",
        Sent = "sent",
        Partial = "partial",
        Failed = "failed",
        Skipped = "skipped",
    }
}

define_status_enum! {
    /// `follow_ups.status`.
    FollowUpStatus {
        Open = "open",
        Completed = "completed",
        Cancelled = "cancelled",
    }
}

define_status_enum! {
    /// `follow_ups.reminder_status`.
    FollowUpReminderStatus {
        Pending = "pending",
        Processing = "processing",
        Sent = "sent",
        Failed = "failed",
        Skipped = "skipped",
    }
}

define_status_enum! {
    /// `webhook_deliveries.status`.
    WebhookDeliveryStatus {
        Pending = "pending",
        Retrying = "retrying",
        Processing = "processing",
        Delivered = "delivered",
        Failed = "failed",
    }
}

define_status_enum! {
    /// `scheduled_reports.status`: whether a run is in flight.
    ScheduledReportStatus {
        Idle = "idle",
        Processing = "processing",
    }
}

define_status_enum! {
    /// `reconciliation_runs.status`.
    ReconciliationRunStatus {
        Pending = "pending",
        Processing = "processing",
        Completed = "completed",
        Failed = "failed",
    }
}

define_status_enum! {
    /// `reconciliation_runs.trigger`.
    ReconciliationTrigger {
        Manual = "manual",
        Scheduled = "scheduled",
    }
}

define_status_enum! {
    /// `reconciliation_discrepancies.status`.
    DiscrepancyStatus {
        Open = "open",
        Resolved = "resolved",
        Ignored = "ignored",
        /// A later run over an overlapping range replaced this finding.
        Superseded = "superseded",
    }
}

define_status_enum! {
    /// `donations.payment_status`.
    PaymentStatus {
        Pending = "pending",
        Succeeded = "succeeded",
        Failed = "failed",
        Refunded = "refunded",
    }
}

define_status_enum! {
    /// `stripe_webhook_events.status`.
    StripeEventStatus {
        Processing = "processing",
        Processed = "processed",
        Failed = "failed",
        Rejected = "rejected",
    }
}
