use std::str::FromStr;
use std::time::Duration;

use benefactor_core::reconciliation::{ReconciliationPolicy, DEFAULT_DATE_TOLERANCE_DAYS};

/// Default claim lease: a row stuck in `processing` longer than this is
/// assumed abandoned by a crashed worker.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 900;

/// How often and how much one poller works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    pub interval: Duration,
    pub batch_size: i64,
}

/// Worker process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub claim_lease_secs: i64,
    pub event_reminders: JobSettings,
    pub follow_ups: JobSettings,
    pub webhook_retries: JobSettings,
    pub scheduled_reports: JobSettings,
    pub reconciliation: JobSettings,
    /// Enqueue a reconciliation of the previous UTC day automatically.
    pub auto_reconcile: bool,
    /// How often the daily enqueue is attempted. Re-enqueueing the same day
    /// is a no-op, so this only bounds how late after midnight it happens.
    pub auto_reconcile_interval: Duration,
    pub reconciliation_policy: ReconciliationPolicy,
    /// How long shutdown waits for in-flight batches.
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default |
    /// |-------------------------------------|---------|
    /// | `CLAIM_LEASE_SECS`                  | `900`   |
    /// | `EVENT_REMINDER_INTERVAL_SECS`      | `60`    |
    /// | `EVENT_REMINDER_BATCH_SIZE`         | `25`    |
    /// | `FOLLOW_UP_INTERVAL_SECS`           | `60`    |
    /// | `FOLLOW_UP_BATCH_SIZE`              | `50`    |
    /// | `WEBHOOK_RETRY_INTERVAL_SECS`       | `30`    |
    /// | `WEBHOOK_RETRY_BATCH_SIZE`          | `50`    |
    /// | `SCHEDULED_REPORT_INTERVAL_SECS`    | `300`   |
    /// | `SCHEDULED_REPORT_BATCH_SIZE`       | `10`    |
    /// | `RECONCILIATION_INTERVAL_SECS`      | `60`    |
    /// | `RECONCILIATION_BATCH_SIZE`         | `2`     |
    /// | `RECONCILE_DAILY`                   | `true`  |
    /// | `RECONCILE_DAILY_CHECK_SECS`        | `3600`  |
    /// | `RECONCILE_DATE_TOLERANCE_DAYS`     | `2`     |
    /// | `RECONCILE_AMOUNT_TOLERANCE_CENTS`  | `0`     |
    /// | `RECONCILE_FUZZY_MATCH`             | `true`  |
    /// | `SHUTDOWN_TIMEOUT_SECS`             | `30`    |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through
    /// `lookup`. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: u64| -> u64 { parse_or(&lookup, key, default) };
        let job = |prefix: &str, interval_secs: u64, batch_size: i64| JobSettings {
            interval: Duration::from_secs(
                get(&format!("{prefix}_INTERVAL_SECS"), interval_secs).max(1),
            ),
            batch_size: parse_or(&lookup, &format!("{prefix}_BATCH_SIZE"), batch_size).max(1),
        };

        let date_tolerance_days: i64 = parse_or(
            &lookup,
            "RECONCILE_DATE_TOLERANCE_DAYS",
            DEFAULT_DATE_TOLERANCE_DAYS,
        );

        Self {
            claim_lease_secs: parse_or(&lookup, "CLAIM_LEASE_SECS", DEFAULT_CLAIM_LEASE_SECS)
                .max(1),
            event_reminders: job("EVENT_REMINDER", 60, 25),
            follow_ups: job("FOLLOW_UP", 60, 50),
            webhook_retries: job("WEBHOOK_RETRY", 30, 50),
            scheduled_reports: job("SCHEDULED_REPORT", 300, 10),
            reconciliation: job("RECONCILIATION", 60, 2),
            auto_reconcile: parse_bool(&lookup, "RECONCILE_DAILY", true),
            auto_reconcile_interval: Duration::from_secs(
                get("RECONCILE_DAILY_CHECK_SECS", 3_600).max(1),
            ),
            reconciliation_policy: ReconciliationPolicy {
                date_tolerance: chrono::Duration::days(date_tolerance_days.max(0)),
                amount_tolerance_cents: parse_or(
                    &lookup,
                    "RECONCILE_AMOUNT_TOLERANCE_CENTS",
                    0_i64,
                )
                .max(0),
                fuzzy_match: parse_bool(&lookup, "RECONCILE_FUZZY_MATCH", true),
            },
            shutdown_timeout: Duration::from_secs(get("SHUTDOWN_TIMEOUT_SECS", 30)),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "true" || v == "1" || v == "yes" => true,
        Some(v) if v == "false" || v == "0" || v == "no" => false,
        _ => default,
    }
}
