//! sentinel-daemon entry point.
//!
//! Thin by design: parses the CLI surface, resolves configuration, wires the
//! database and check registry, starts the scheduler loops, and — unless
//! `--no-api` — serves the read-only Query API. All handler logic lives in
//! `routes.rs`; all shared state lives in `state.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sentinel_alerts::{AlertManager, NotificationSink, TicketSink};
use sentinel_checks::instantiate_enabled;
use sentinel_config::SentinelConfig;
use sentinel_daemon::{routes, scheduler, state::AppState};
use sentinel_http::ProbeClient;
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};

/// Continuous black-box monitoring engine.
#[derive(Parser, Debug)]
#[command(name = "sentinel-daemon", version)]
struct Cli {
    /// Run checks without serving the Query API.
    #[arg(long)]
    standalone: bool,

    /// Port the Query API listens on (ignored with --standalone or --no-api).
    #[arg(long, default_value_t = 9090)]
    api_port: u16,

    /// Disable the Query API entirely (checks still run on schedule).
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let config = SentinelConfig::from_env();
    info!(db_path = %config.db_path, target = %config.target_base_url, "starting sentinel-daemon");

    let pool = sentinel_db::connect(&config.db_path)
        .await
        .context("connect to sentinel database")?;
    sentinel_db::migrate(&pool).await.context("run database migrations")?;

    let probe_client = ProbeClient::new(config.credential.clone());
    let checks = instantiate_enabled(&config, probe_client);
    if checks.is_empty() {
        error!("no checks enabled; SENTINEL_ENABLED_CHECKS resolved to an empty set");
    }

    let notification_sink = match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            Some(NotificationSink::new(token, chat_id, config.telegram_rate_limit))
        }
        _ => {
            info!("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not configured; notifications disabled");
            None
        }
    };

    let ticket_sink = match (&config.github_token, &config.github_repo) {
        (Some(token), Some(repo)) => Some(TicketSink::new(token, repo)),
        _ => {
            info!("GITHUB_TOKEN/SENTINEL_GITHUB_REPO not configured; ticket filing disabled");
            None
        }
    };

    let alert_manager = Arc::new(AlertManager::new(
        pool.clone(),
        config.alert_threshold_failures,
        config.dedup_window_minutes,
        notification_sink,
        ticket_sink,
    ));

    let notification_sink_connected = alert_manager.test_notification_connection().await;
    match notification_sink_connected {
        Some(true) => info!("notification sink connection check succeeded"),
        Some(false) => warn!("notification sink connection check failed; alerts will still queue"),
        None => {}
    }

    let state = Arc::new(AppState::new(
        config.clone(),
        pool,
        checks,
        alert_manager,
        notification_sink_connected,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = tokio::spawn(scheduler::run_scheduler(state.clone(), shutdown_rx.clone()));
    let summary_handle = tokio::spawn(scheduler::run_summary_loop(state.clone(), shutdown_rx.clone()));

    let server_handle = if cli.standalone || cli.no_api {
        info!("Query API disabled (--standalone or --no-api)");
        None
    } else {
        let app = routes::build_router(state.clone())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(cors_localhost_only());

        let addr = SocketAddr::from(([127, 0, 0, 1], cli.api_port));
        info!("sentinel-daemon Query API listening on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind Query API to {addr}"))?;
        Some(tokio::spawn(async move {
            axum::serve(listener, app).await.context("server crashed")
        }))
    };

    tokio::signal::ctrl_c().await.context("listen for ctrl_c")?;
    info!("shutdown signal received, draining in-flight work");
    let _ = shutdown_tx.send(true);

    let _ = scheduler_handle.await;
    let _ = summary_handle.await;
    if let Some(handle) = server_handle {
        handle.abort();
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins, mirroring the operator-facing
/// dashboards this daemon is meant to be polled from.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
