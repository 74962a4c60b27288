use std::sync::{Arc, Mutex};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::services::calendar::http::HttpCalendarProvider;
use slotbook::services::calendar::{CalendarProvider, DisconnectedCalendar};
use slotbook::services::messaging::email::HttpEmailSender;
use slotbook::services::messaging::{LogSender, NotificationSender};
use slotbook::services::reminders;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    config.validate()?;

    let conn = db::init_db(&config.database_url)?;

    let calendar: Box<dyn CalendarProvider> = if config.calendar_api_url.is_empty() {
        tracing::info!("CALENDAR_API_URL not set, calendar sync disabled");
        Box::new(DisconnectedCalendar)
    } else {
        tracing::info!("using calendar service at {}", config.calendar_api_url);
        Box::new(HttpCalendarProvider::new(
            config.calendar_api_url.clone(),
            config.calendar_api_token.clone(),
        ))
    };

    let notifier: Box<dyn NotificationSender> = if config.email_api_url.is_empty() {
        tracing::info!("EMAIL_API_URL not set, reminders will only be logged");
        Box::new(LogSender)
    } else {
        anyhow::ensure!(
            !config.email_api_key.is_empty(),
            "EMAIL_API_KEY must be set when EMAIL_API_URL is set"
        );
        Box::new(HttpEmailSender::new(
            config.email_api_url.clone(),
            config.email_api_key.clone(),
            config.email_from.clone(),
        ))
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        calendar,
        notifier,
    });

    tokio::spawn(reminders::run_reminder_scheduler(Arc::clone(&state)));
    tracing::info!(
        tick = ?config.reminder_tick,
        lead_hours = config.reminder_lead_hours,
        "reminder scheduler started"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
