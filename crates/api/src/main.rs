use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use benefactor_api::config::ServerConfig;
use benefactor_api::router::build_app_router;
use benefactor_api::state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        stripe_webhook = config.stripe_webhook.is_some(),
        "Loaded server configuration"
    );
    if config.stripe_webhook.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, Stripe webhooks will be rejected");
    }

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

    // --- Router ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    let drain_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let app = build_app_router(AppState {
        pool,
        config: Arc::new(config),
    });

    // --- Start server ---
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(%addr, "Starting server");

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = stop_tx.send(true);

    match tokio::time::timeout(drain_timeout, server).await {
        Ok(joined) => joined.context("Server task panicked")?.context("Server error")?,
        Err(_) => tracing::warn!(
            timeout_secs = drain_timeout.as_secs(),
            "In-flight requests did not drain before the shutdown timeout"
        ),
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// `RUST_LOG` filter (default `benefactor_api=debug,tower_http=debug`);
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "benefactor_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
