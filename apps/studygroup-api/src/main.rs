use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studygroup_api::clock::SystemClock;
use studygroup_api::config::Config;
use studygroup_api::db::PgStore;
use studygroup_api::services::reminders::spawn_reminder_loop;
use studygroup_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let pool = studygroup_api::db::pool::connect(&config.database_url, config.db_pool_size)
        .expect("failed to build connection pool");
    let store = Arc::new(PgStore::new(pool));

    let mailer = studygroup_api::email::create_mailer(&config)
        .expect("invalid mail configuration");

    tracing::info!(
        worker_id = config.worker_id,
        reminder_interval_secs = config.reminder_interval_secs,
        "studygroup-api configured"
    );

    let interval = config.reminder_interval();
    let state = AppState::new(config, store, Arc::from(mailer), Arc::new(SystemClock));
    let reminder_loop = spawn_reminder_loop(Arc::clone(&state.reminders), interval);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(studygroup_api::routes::router(&state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "studygroup-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    reminder_loop.abort();
    tracing::info!("studygroup-api stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
