use std::sync::Arc;

use anyhow::Context;
use benefactor_core::batch_runner::IntervalBatchRunner;
use benefactor_core::retry::RetryPolicy;
use benefactor_notify::{
    EmailConfig, EmailSender, HttpWebhookSender, SmsConfig, SmsSender, SmtpEmailSender,
    TwilioSmsSender,
};
use benefactor_payments::{PaymentProvider, StripeClient, StripeConfig, PROVIDER_STRIPE};
use benefactor_worker::config::WorkerConfig;
use benefactor_worker::jobs::{
    runner_for, Channels, EventReminderJob, FollowUpJob, ReconciliationJob,
    ReconciliationScheduler, ScheduledReportJob, WebhookRetryJob,
};
use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        claim_lease_secs = config.claim_lease_secs,
        auto_reconcile = config.auto_reconcile,
        "Loaded worker configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = benefactor_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    benefactor_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    benefactor_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Delivery channels ---
    let channels = build_channels()?;
    let webhook_sender = Arc::new(HttpWebhookSender::new()?);
    let provider: Option<Arc<dyn PaymentProvider>> = match StripeConfig::from_env() {
        Some(stripe) => Some(Arc::new(StripeClient::new(stripe)?)),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, reconciliation runs will fail");
            None
        }
    };

    // --- Runners ---
    let lease = config.claim_lease_secs;
    let mut runners = vec![
        runner_for(
            Arc::new(EventReminderJob::new(
                pool.clone(),
                channels.clone(),
                config.event_reminders.batch_size,
                lease,
            )),
            config.event_reminders.interval,
        ),
        runner_for(
            Arc::new(FollowUpJob::new(
                pool.clone(),
                channels.clone(),
                config.follow_ups.batch_size,
                lease,
            )),
            config.follow_ups.interval,
        ),
        runner_for(
            Arc::new(WebhookRetryJob::new(
                pool.clone(),
                webhook_sender,
                RetryPolicy::default(),
                config.webhook_retries.batch_size,
                lease,
            )),
            config.webhook_retries.interval,
        ),
        runner_for(
            Arc::new(ScheduledReportJob::new(
                pool.clone(),
                channels,
                config.scheduled_reports.batch_size,
                lease,
            )),
            config.scheduled_reports.interval,
        ),
        runner_for(
            Arc::new(ReconciliationJob::new(
                pool.clone(),
                provider,
                config.reconciliation_policy.clone(),
                config.reconciliation.batch_size,
                lease,
            )),
            config.reconciliation.interval,
        ),
    ];

    if config.auto_reconcile {
        let scheduler = Arc::new(ReconciliationScheduler::new(pool.clone(), PROVIDER_STRIPE));
        runners.push(IntervalBatchRunner::new(
            "reconciliation_scheduler",
            config.auto_reconcile_interval,
            move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    let run = scheduler.enqueue_previous_day(Utc::now()).await?;
                    Ok(usize::from(run.is_some()))
                }
            },
        ));
    }

    for runner in &runners {
        runner.start();
    }
    tracing::info!(runners = runners.len(), "Worker started");

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping runners");

    futures::future::join_all(
        runners
            .iter()
            .map(|runner| runner.shutdown(config.shutdown_timeout)),
    )
    .await;

    for runner in &runners {
        let snapshot = runner.snapshot();
        tracing::info!(
            runner = %snapshot.name,
            total_processed = snapshot.total_processed,
            consecutive_failures = snapshot.consecutive_failures,
            "Runner final state"
        );
    }
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// `RUST_LOG` filter (default `benefactor_worker=debug,benefactor_core=info`);
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "benefactor_worker=debug,benefactor_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_channels() -> anyhow::Result<Channels> {
    let email: Option<Arc<dyn EmailSender>> = match EmailConfig::from_env() {
        Some(config) => Some(Arc::new(SmtpEmailSender::new(config)?)),
        None => {
            tracing::warn!("SMTP_HOST not set, email delivery disabled");
            None
        }
    };
    let sms: Option<Arc<dyn SmsSender>> = match SmsConfig::from_env() {
        Some(config) => Some(Arc::new(TwilioSmsSender::new(config)?)),
        None => {
            tracing::warn!("SMS provider not configured, SMS delivery disabled");
            None
        }
    };
    Ok(Channels { email, sms })
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
