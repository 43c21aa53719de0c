//! Token-metered image classification API
//!
//! Single-binary Rust service that:
//! 1. Registers users and verifies credentials (salted Argon2 digests)
//! 2. Meters classification behind an atomic per-user token ledger
//! 3. Fetches images within size/time bounds and delegates inference to
//!    an external model backend
//! 4. Lets an admin holding the configured secret refill balances

mod admin;
mod api;
mod config;
mod coordinate;
mod error;
mod fetch;
mod metrics;

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use accounts::{CredentialStore, TokenLedger, UserStore};
use classifier::{Classifier, HttpClassifier};

use crate::admin::AdminRefillService;
use crate::config::Config;
use crate::coordinate::Coordinator;
use crate::fetch::ResourceFetcher;
use crate::metrics::ServiceMetrics;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialStore,
    pub coordinator: Coordinator,
    pub admin: AdminRefillService,
    pub classifier: Arc<dyn Classifier>,
    pub store: Arc<UserStore>,
    pub metrics: ServiceMetrics,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies the CORS layer and a concurrency limit based on
/// `max_connections`.
pub fn build_router(state: AppState, max_connections: usize, cors: CorsLayer) -> Router {
    Router::new()
        .route("/v1/register", post(api::register_handler))
        .route("/v1/login", post(api::login_handler))
        .route("/v1/classify", post(api::classify_handler))
        .route("/v1/refill", post(admin::refill_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Build the CORS layer from configured origins; `"*"` permits any origin.
pub fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<axum::http::HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(origin = %o, error = %e, "skipping invalid CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting classify-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        inference_url = %config.inference.url,
        store_path = %config.store.path.display(),
        starting_tokens = config.store.starting_tokens,
        max_image_mb = config.fetch.max_image_mb,
        "configuration loaded"
    );

    let store = Arc::new(
        UserStore::load(config.store.path.clone())
            .await
            .context("failed to load user store")?,
    );

    let http_client = reqwest::Client::new();

    let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(
        http_client.clone(),
        config.inference.url.clone(),
        config.inference.top_k,
        Duration::from_secs(config.inference.timeout_secs),
    ));

    let fetcher = ResourceFetcher::new(
        http_client,
        config.fetch.max_bytes(),
        Duration::from_secs(config.fetch.timeout_secs),
    );

    let credentials = CredentialStore::new(store.clone(), config.store.starting_tokens);
    let ledger = TokenLedger::new(store.clone());
    let coordinator = Coordinator::new(
        credentials.clone(),
        ledger.clone(),
        fetcher,
        classifier.clone(),
    );

    let Some(secret_hash) = config.admin.secret_hash.clone() else {
        anyhow::bail!("admin secret digest missing after config validation");
    };
    let admin = AdminRefillService::new(secret_hash, ledger);

    let state = AppState {
        credentials,
        coordinator,
        admin,
        classifier,
        store,
        metrics: ServiceMetrics::new(),
        prometheus: prometheus_handle,
    };

    let app = build_router(
        state,
        config.server.max_connections,
        build_cors(&config.server.cors_origins),
    );

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain so a slow fetch cannot block exit
    //
    // The drain timer starts at signal receipt, not at server start: the
    // server is notified through the oneshot and then raced against the
    // timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness probe: always 200 while the process is serving.
async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "uptime_seconds": uptime,
            "requests_served": requests,
            "errors_total": errors,
        })),
    )
}

/// Readiness probe: 200 only when the user store is reachable and the
/// inference backend answers.
async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.store.ping().await;
    let model_ok = state.classifier.ready().await;

    let status = if store_ok && model_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "store": store_ok,
            "model": model_ok,
        })),
    )
}

/// Prometheus metrics endpoint — returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
