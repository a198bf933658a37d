//! AnyTools API Server
//!
//! REST surface for user-defined mock endpoints and for relaying requests
//! through ordered groups of third-party providers.

use alerting::{LogNotifier, Notifier, ThrottledNotifier, WebhookNotifier};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{any, get, patch, post},
    Json, Router,
};
use fallback::FallbackExecutor;
use metrics_exporter_prometheus::PrometheusHandle;
use mock_engine::MockEngine;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storage::{DefinitionStore, MemoryStore};
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub mod config;
pub mod error;
pub mod providers;
pub mod rate_limit;
mod routes;
pub mod telemetry;

pub use config::AppConfig;
pub use error::ApiError;
pub use telemetry::init_logging;

use providers::ProviderRegistry;
use rate_limit::create_governor_config;

/// Application state shared across handlers
pub struct AppState {
    /// Concrete store, kept for maintenance tasks
    pub store: Arc<MemoryStore>,
    pub definitions: Arc<dyn DefinitionStore>,
    pub engine: MockEngine,
    pub executor: FallbackExecutor,
    pub providers: ProviderRegistry,
    pub config: AppConfig,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build state with the notifier described by `config.notifier`
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let throttle = config.notifier.throttle.clone();
        let notifier: Arc<dyn Notifier> = match &config.notifier.webhook_url {
            Some(url) => {
                let timeout = Duration::from_millis(config.notifier.timeout_ms);
                info!("Alerts will be posted to {}", url);
                Arc::new(ThrottledNotifier::new(
                    WebhookNotifier::new(url.clone(), timeout)?,
                    throttle,
                ))
            }
            None => {
                info!("No alert webhook configured, alerts are logged only");
                Arc::new(ThrottledNotifier::new(LogNotifier, throttle))
            }
        };
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: AppConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::with_ttl(config.mock.ttl()));
        Self::with_store(config, notifier, store)
    }

    pub fn with_store(
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        store: Arc<MemoryStore>,
    ) -> anyhow::Result<Self> {
        let engine = MockEngine::new(store.clone(), store.clone());
        let providers = providers::build_registry(&config.providers)?;

        Ok(Self {
            definitions: store.clone(),
            store,
            engine,
            executor: FallbackExecutor::new(notifier),
            providers,
            config,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Remove expired definitions along with their cached templates
    pub fn purge_expired(&self) -> Result<usize, storage::StorageError> {
        let removed = self.store.purge_expired()?;
        for id in &removed {
            self.engine.evict(id);
        }
        Ok(removed.len())
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub mock_definitions: usize,
    pub relay_groups: usize,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    // Public routes share one per-IP limiter
    let mut public = Router::new()
        .route("/mock/:id", any(routes::serve::serve))
        .route("/api/v1/relay/:group", post(routes::relay::relay));
    if state.config.rate_limit.enabled {
        match create_governor_config(&state.config.rate_limit) {
            Some(config) => public = public.layer(GovernorLayer { config }),
            None => warn!("Invalid rate limit settings, public routes are not limited"),
        }
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/v1/mocks",
            post(routes::mocks::create).get(routes::mocks::list),
        )
        .route(
            "/api/v1/mocks/:id",
            get(routes::mocks::get_one).delete(routes::mocks::delete),
        )
        .route("/api/v1/mocks/:id/share", patch(routes::mocks::share))
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            mock_definitions: state.store.definition_count(),
            relay_groups: state.providers.len(),
        },
    })
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn spawn_purge_task(state: SharedState, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.purge_expired() {
                Ok(0) => debug!("No expired mock definitions"),
                Ok(n) => info!("Purged {} expired mock definitions", n),
                Err(e) => warn!("Failed to purge expired definitions: {}", e),
            }
        }
    });
}

/// Run the server until it fails
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let addr = config.server.addr.clone();
    let purge_every = Duration::from_secs(config.mock.purge_interval_secs.max(1));

    let handle = telemetry::init_metrics_recorder()?;
    let state = Arc::new(AppState::from_config(config)?.with_metrics(handle));
    spawn_purge_task(state.clone(), purge_every);

    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
