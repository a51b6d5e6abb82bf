//! API session daemon
//!
//! Single-binary service that:
//! 1. Loads the OAuth client identity and stored tokens
//! 2. Serves the login callback, /health and /metrics
//! 3. Logs in: refresh when possible, interactive browser login otherwise
//! 4. Optionally checks the remote API through the resilient executor

mod callback;
mod config;
mod error;
mod metrics;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use executor::{Executor, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use oauth::{CredentialStore, HttpTokenEndpoint};
use remote::{HttpTransport, RequestDescriptor};
use session::{AuthManager, AuthState, BrowserLauncher, NoBrowser, SystemBrowser};

use crate::callback::CallbackState;
use crate::config::Config;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    auth: Arc<AuthManager>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router: health, metrics, and the login callback.
///
/// A concurrency limit layer caps in-flight requests at `max_connections`.
fn build_router(state: AppState, callback_path: &str, max_connections: usize) -> Router {
    let callback_router =
        callback::build_callback_router(CallbackState::new(state.auth.clone()), callback_path);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(callback_router)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
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

    info!("starting api-sessiond");

    // Install Prometheus metrics recorder before any metrics are emitted
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

    info!(
        listen_addr = %config.server.listen_addr,
        base_url = %config.api.base_url,
        redirect_uri = %config.redirect_uri,
        scopes = config.oauth.required_scopes.len(),
        "configuration loaded"
    );

    let credentials_path = config.oauth.credentials_file.clone();
    let store = Arc::new(
        CredentialStore::load(credentials_path.clone())
            .await
            .with_context(|| {
                format!("failed to load credentials from {}", credentials_path.display())
            })?,
    );
    let credential = store.snapshot().await;
    info!(
        path = %credentials_path.display(),
        has_tokens = credential.has_token_pair(),
        "credentials loaded"
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let endpoint = Arc::new(HttpTokenEndpoint::new(
        http_client.clone(),
        config.oauth.token_endpoint.clone(),
        config.redirect_uri.clone(),
        credential.client_id.clone(),
        credential.client_secret.clone(),
    ));
    let browser: Arc<dyn BrowserLauncher> = if config.oauth.open_browser {
        Arc::new(SystemBrowser)
    } else {
        Arc::new(NoBrowser)
    };

    let auth = Arc::new(
        AuthManager::new(store, endpoint, browser, config.oauth_settings())
            .with_login_timeout(Duration::from_secs(config.oauth.login_timeout_secs))
            .with_refresh_timeout(Duration::from_secs(config.oauth.refresh_timeout_secs)),
    );

    let app_state = AppState {
        auth: auth.clone(),
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };
    let app = build_router(
        app_state,
        &config.server.callback_path,
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(
        addr = %listen_addr,
        callback_path = %config.server.callback_path,
        "listening for login callbacks"
    );

    // The listener must be serving before the first login: an interactive
    // login completes through the callback route.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let established = tokio::select! {
        result = establish_session(&config, &http_client, auth) => Some(result),
        _ = shutdown_signal() => None,
    };

    match established {
        Some(Ok(())) => {
            info!("session established");
            shutdown_signal().await;
        }
        Some(Err(e)) => {
            error!(error = %e, "failed to establish session");
            let _ = shutdown_tx.send(());
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await;
            return Err(e);
        }
        None => info!("shutdown requested before the session was established"),
    }

    // Signal the server to begin draining
    let _ = shutdown_tx.send(());

    // The drain timer starts at signal receipt
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

/// Log in, then run the optional end-to-end check through the executor.
///
/// A failed check is logged, not fatal: the session itself is valid.
async fn establish_session(
    config: &Config,
    client: &reqwest::Client,
    auth: Arc<AuthManager>,
) -> Result<()> {
    auth.initial_login().await.context("initial login failed")?;

    let Some(check_path) = &config.api.check_path else {
        return Ok(());
    };

    let transport = Arc::new(HttpTransport::new(
        client.clone(),
        config.api.base_url.clone(),
        Duration::from_secs(config.api.timeout_secs),
    ));
    let executor = Executor::new(transport, auth)
        .with_policy(RetryPolicy::default().with_max_attempts(config.retry.max_attempts));

    match executor
        .execute::<serde_json::Value>(RequestDescriptor::get(check_path.clone()))
        .await
    {
        Ok(_) => info!(path = %check_path, "API check succeeded"),
        Err(e) => warn!(
            path = %check_path,
            error = %e,
            classification = e.classification().map(|c| c.label()).unwrap_or("none"),
            "API check failed"
        ),
    }
    Ok(())
}

/// Health endpoint: JSON with status, auth state, and uptime.
///
/// Returns 200 while a usable token is held (or being refreshed), 503 while
/// waiting on an interactive login or after the session has failed.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let auth_state = state.auth.state().await;

    let (status_code, status) = match auth_state {
        AuthState::Authenticated | AuthState::Refreshing => {
            (axum::http::StatusCode::OK, "healthy")
        }
        AuthState::Fatal { .. } => (axum::http::StatusCode::SERVICE_UNAVAILABLE, "failed"),
        AuthState::Unauthenticated | AuthState::AwaitingInteractiveLogin => {
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    let body = serde_json::json!({
        "status": status,
        "auth_state": auth_state.label(),
        "uptime_seconds": uptime,
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support::{FakeEndpoint, RecordingBrowser, SCOPED_FILE, test_auth};

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    async fn test_app_state(dir: &tempfile::TempDir, contents: Option<&str>) -> AppState {
        AppState {
            auth: test_auth(
                dir,
                contents,
                Arc::new(FakeEndpoint::default()),
                Arc::new(RecordingBrowser::default()),
            )
            .await,
            started_at: Instant::now(),
            prometheus: test_prometheus_handle(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_is_degraded_before_login() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_app_state(&dir, None).await;
        let app = build_router(state, "/callback", 16);

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["auth_state"], "unauthenticated");
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn health_is_healthy_after_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_app_state(&dir, Some(SCOPED_FILE)).await;
        state.auth.refresh().await.unwrap();
        let app = build_router(state, "/callback", 16);

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["auth_state"], "authenticated");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_app_state(&dir, None).await;
        let app = build_router(state, "/callback", 16);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("text/plain"), "got: {content_type}");
    }

    #[tokio::test]
    async fn callback_is_mounted_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_app_state(&dir, None).await;
        let app = build_router(state, "/oauth/done", 16);

        // No login is pending, so the handler answers 400 rather than 404
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/oauth/done?code=abc&state=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/callback?code=abc&state=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
