use anyhow::Result;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use otpbot_server::config::Config;
use otpbot_server::sms::SmsClient;
use otpbot_server::state_machine::policy::OtpPolicy;
use otpbot_server::state_machine::repository::SqliteRepository;
use otpbot_server::state_machine::store::StateStore;
use otpbot_server::telegram::TelegramClient;
use otpbot_server::webhook::{claim_cleanup_loop, webhook_router};
use otpbot_server::AppState;

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "otpbot"
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Telegram OTP bot");

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let telegram_client = TelegramClient::new(config.telegram_bot_token);
    let sms_client = SmsClient::new(config.sms_gateway_url, config.sms_gateway_token);

    info!("Using state database: {}", config.database_path.display());
    let sqlite_repo =
        SqliteRepository::new(&config.database_path).expect("Failed to initialize SQLite database");
    let repository = Arc::new(sqlite_repo);

    let policy = OtpPolicy::with_cooldown_seconds(config.otp_cooldown_seconds);

    let app_state = Arc::new(AppState {
        notifier: Arc::new(telegram_client),
        dispatcher: Arc::new(sms_client),
        webhook_secret: config.telegram_webhook_secret,
        state_store: Arc::new(StateStore::with_repository(repository.clone(), policy)),
        repository,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state.clone());

    // Start the update claim cleanup loop
    let cleanup_state = app_state.clone();
    tokio::spawn(async move {
        claim_cleanup_loop(cleanup_state).await;
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
