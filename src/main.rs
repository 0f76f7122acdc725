// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::Utc;
use dotenvy::dotenv;
use quiz_session::config::{Config, SecurityPolicy};
use quiz_session::routes;
use quiz_session::session::{QuizSession, store::FileStore, timers::SessionTimers};
use quiz_session::state::AppState;
use quiz_session::utils::{fullscreen::ReportedFullscreen, grading::HttpGradingClient};
use tokio::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "session.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let grading = Arc::new(HttpGradingClient::from_config(&config)?);
    let store = FileStore::open(&config.storage_dir)?;
    let fullscreen = Arc::new(ReportedFullscreen::new());

    let mut session = QuizSession::new(
        Box::new(store),
        grading,
        fullscreen.clone(),
        SecurityPolicy::default(),
    );

    // Load failures are kept in the session phase so the shell can render them.
    match session.load(Some(&config.attempt_id), Utc::now()).await {
        Ok(()) => tracing::info!("Attempt {} loaded", config.attempt_id),
        Err(e) => tracing::error!("Attempt {} could not be loaded: {}", config.attempt_id, e),
    }

    let session = Arc::new(Mutex::new(session));
    let _timers = SessionTimers::spawn(session.clone());

    let state = AppState {
        session,
        fullscreen,
    };

    let shell_origin: HeaderValue = config.shell_origin.parse()?;
    let app = routes::create_router(state, shell_origin);

    // Loopback only: the sidecar serves the local client shell.
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    tracing::info!("Proctor sidecar listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Proctor sidecar stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
