//! Records Gateway
//!
//! Single-binary Rust service that:
//! 1. Loads its configuration and seeds the session credential
//! 2. Listens for incoming requests
//! 3. Forwards them to the records backend with the gateway's credential
//! 4. On credential expiry, renews once for every caller and replays each
//!    request at most once; a failed renewal ends the session

mod config;
mod error;
mod metrics;
mod navigator;
mod proxy;
mod service;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use session_auth::{CredentialHolder, HttpRenewer};
use session_refresh::{Dispatcher, RefreshCoordinator, SessionInvalidator};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::HttpTransport;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::navigator::LoginRedirect;
use crate::proxy::ProxyState;
use crate::service::{DRAIN_TIMEOUT, ServiceMetrics};

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    navigator: Arc<LoginRedirect>,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Wire holder, renewer, coordinator and dispatcher from the loaded config.
fn build_state(config: &Config, prometheus: PrometheusHandle) -> Result<AppState> {
    let client = reqwest::Client::new();
    let renewal_url = config.renewal_url()?;
    let entry_point = config.entry_point()?;

    let holder = Arc::new(CredentialHolder::new(config.auth.access_token.clone()));
    let navigator = Arc::new(LoginRedirect::new(entry_point.clone()));
    let renewer = Arc::new(HttpRenewer::new(
        client.clone(),
        renewal_url,
        config.auth.session_cookie.clone(),
    ));
    let coordinator = Arc::new(RefreshCoordinator::new(
        holder.clone(),
        renewer,
        SessionInvalidator::new(holder.clone(), navigator.clone()),
        config.auth.renewal_timeout(),
    ));
    let transport = Arc::new(HttpTransport::new(client, config.gateway.timeout()));
    let dispatcher = Arc::new(Dispatcher::new(transport, holder, coordinator));

    Ok(AppState {
        proxy: ProxyState {
            dispatcher,
            backend_url: config.backend.url.clone(),
            login_url: entry_point,
            metrics: ServiceMetrics::new(),
        },
        navigator,
        prometheus,
    })
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

    info!("starting records-gateway");

    // Install before anything records a metric
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

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

    let renewal_url = config.renewal_url()?;
    info!(
        listen_addr = %config.gateway.listen_addr,
        backend_url = %config.backend.url,
        renewal_url = %renewal_url,
        session_cookie = config.auth.session_cookie.is_some(),
        initial_credential = config.auth.access_token.is_some(),
        "configuration loaded"
    );
    if config.auth.session_cookie.is_none() {
        warn!("no session cookie configured, renewals will be rejected");
    }

    let app_state = build_state(&config, prometheus_handle)?;
    let in_flight = app_state.proxy.metrics.in_flight.clone();
    let app = build_router(app_state, config.gateway.max_connections);

    let listen_addr = config.gateway.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts at signal receipt, not at server start
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
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: session state, coordinator state and request counters.
/// Returns 200 while the session is live, 503 once it has been torn down.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = &state.proxy.metrics;
    let holder = state.proxy.dispatcher.holder();
    let refresh = state.proxy.dispatcher.coordinator().status();
    let cleared = holder.is_cleared().await;
    let status = if cleared { "session_expired" } else { "healthy" };
    let credential = if holder.is_present().await {
        "present"
    } else {
        "absent"
    };

    let mut body = serde_json::json!({
        "status": status,
        "credential": credential,
        "refresh": refresh.label(),
        "waiters": refresh.waiters,
        "session_invalidations": state.navigator.navigations(),
        "uptime_seconds": metrics.started_at.elapsed().as_secs(),
        "requests_served": metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": metrics.errors_total.load(Ordering::Relaxed),
    });
    let status_code = if cleared {
        body["login_url"] = serde_json::Value::String(state.navigator.entry_point().to_string());
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
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

/// Catch-all handler that forwards everything else to the backend.
async fn proxy_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::proxy_request(&state.proxy, request, request_id).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
