//! HTTP server for the probe and self-metrics endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::collector::SharedCollector;
use crate::config::HttpConfig;
use crate::module::ModuleSet;
use crate::render::{CONTENT_TYPE as EXPOSITION_CONTENT_TYPE, render_samples};

/// Scheme prefix of an API key passed in the `Authorization` header.
const API_KEY_SCHEME: &str = "APIKEY ";

/// Probe defaults resolved at startup.
#[derive(Debug, Clone, Default)]
pub struct ProbeSettings {
    /// Modules collected when a probe names none.
    pub default_modules: ModuleSet,
    /// API key used when the probe request carries none.
    pub api_key: Option<String>,
}

/// Rejected probe request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("'target' parameter must be specified once")]
    Target,
}

impl IntoResponse for ProbeError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// A validated probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub target: String,
    pub modules: ModuleSet,
}

impl ProbeRequest {
    /// Validate raw query parameters.
    ///
    /// `target` must appear exactly once and be non-empty. Without any
    /// `modules` parameter the default set applies.
    pub fn from_params(
        params: &[(String, String)],
        default_modules: &ModuleSet,
    ) -> Result<Self, ProbeError> {
        let mut targets = params.iter().filter(|(k, _)| k == "target").map(|(_, v)| v);
        let target = match (targets.next(), targets.next()) {
            (Some(target), None) if !target.is_empty() => target.clone(),
            _ => return Err(ProbeError::Target),
        };

        let tags: Vec<&str> = params
            .iter()
            .filter(|(k, _)| k == "modules")
            .map(|(_, v)| v.as_str())
            .collect();
        let modules = if tags.is_empty() {
            default_modules.clone()
        } else {
            ModuleSet::from_tags(tags)
        };

        Ok(Self { target, modules })
    }
}

/// API key carried by an `Authorization: APIKEY <key>` header.
pub fn header_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(API_KEY_SCHEME)
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: SharedCollector,
    settings: Arc<ProbeSettings>,
}

/// Create the HTTP router.
fn create_router(
    collector: SharedCollector,
    settings: ProbeSettings,
    probe_path: &str,
    metrics_path: &str,
) -> Router {
    let state = AppState {
        collector,
        settings: Arc::new(settings),
    };

    Router::new()
        .route(probe_path, get(probe_handler))
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for the probe endpoint.
///
/// Dropping this future (client disconnect) aborts in-flight upstream requests.
async fn probe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ProbeError> {
    let request = ProbeRequest::from_params(&params, &state.settings.default_modules)
        .inspect_err(|e| debug!(error = %e, "Rejected probe request"))?;

    let api_key = header_api_key(&headers).or(state.settings.api_key.as_deref());

    let samples = state
        .collector
        .collect(&request.target, &request.modules, api_key)
        .await;

    Ok(exposition(render_samples(&samples)))
}

/// Handler for the exporter self-metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    exposition(render_samples(&state.collector.self_metrics()))
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

fn exposition(body: String) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response()
}

/// HTTP server configuration.
pub struct HttpServer {
    collector: SharedCollector,
    settings: ProbeSettings,
    listen_addr: SocketAddr,
    probe_path: String,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        collector: SharedCollector,
        settings: ProbeSettings,
        listen_addr: SocketAddr,
        http: &HttpConfig,
    ) -> Self {
        Self {
            collector,
            settings,
            listen_addr,
            probe_path: http.probe_path.clone(),
            metrics_path: http.metrics_path.clone(),
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(
            self.collector,
            self.settings,
            &self.probe_path,
            &self.metrics_path,
        );

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            probe_path = %self.probe_path,
            metrics_path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
