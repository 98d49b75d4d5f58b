mod config;
mod constants;
mod domain;
mod i18n;
mod middleware;
mod models;
mod moderation;
mod recorder;
mod routes;
mod services;
mod storage;
mod upload;
mod views;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use tokio::signal::{
    self,
    unix::{SignalKind, signal as unix_signal},
};
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use config::Config;
use constants::QUEUE_IDLE_SECS;
use domain::contributions::{ContributionRepo, PostgrestContributions};
use moderation::RowLocks;
use recorder::RecorderHub;
use services::auth::AuthClient;
use services::auth_events::AuthEvents;
use services::db::Postgrest;
use services::rate_limit::{SUBMIT_RATE_LIMITER, UPLOAD_RATE_LIMITER};
use storage::{StorageClient, VideoStore};
use upload::QueueStore;

pub struct AppState {
    pub config: Config,
    pub auth: AuthClient,
    pub db: Postgrest,
    pub store: Arc<dyn VideoStore>,
    pub contributions: Arc<dyn ContributionRepo>,
    pub queues: Arc<QueueStore>,
    pub recorders: RecorderHub,
    pub auth_events: AuthEvents,
    pub row_locks: RowLocks,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let db = Postgrest::new(&config);
        let queues = Arc::new(QueueStore::new());
        Self {
            auth: AuthClient::new(&config),
            store: Arc::new(StorageClient::new(&config)),
            contributions: Arc::new(PostgrestContributions::new(db.clone())),
            recorders: RecorderHub::new(queues.clone()),
            queues,
            db,
            auth_events: AuthEvents::new(),
            row_locks: RowLocks::new(),
            config,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let mut state = Self::new(Config::for_tests());
        state.store = Arc::new(storage::memory::MemoryStore::default());
        state.contributions = Arc::new(domain::contributions::memory::MemoryRepo::default());
        state
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn recorder_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        include_str!("../static/recorder.js"),
    )
}

async fn style_css() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        include_str!("../static/style.css"),
    )
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub fn build_app(state: Arc<AppState>) -> Router {
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/favicon.ico", get(favicon))
        .route("/static/recorder.js", get(recorder_js))
        .route("/static/style.css", get(style_css))
        .merge(routes::build_routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::session_layer,
        ))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CatchPanicLayer::custom(routes::error::panic_page))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Forget rate-limit buckets and submission queues of users who went quiet
async fn cleanup_idle_state(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(10 * 60));
    loop {
        interval.tick().await;
        UPLOAD_RATE_LIMITER.cleanup(Duration::from_secs(60 * 60));
        SUBMIT_RATE_LIMITER.cleanup(Duration::from_secs(60 * 60));
        let evicted = state
            .queues
            .evict_idle(Duration::from_secs(QUEUE_IDLE_SECS));
        if evicted > 0 {
            tracing::info!("Dropped {} idle submission queues", evicted);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        match unix_signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ihearu=debug,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    if config.supabase_jwt_secret.is_none() {
        tracing::warn!("SUPABASE_JWT_SECRET not set, access tokens are checked against the auth API");
    }

    let state = Arc::new(AppState::new(config));
    tokio::spawn(cleanup_idle_state(state.clone()));

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
