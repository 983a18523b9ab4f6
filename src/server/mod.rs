// HTTP surface: readiness, Prometheus metrics and runtime log level

use crate::config::LogLevel;
use crate::daemon::ReaperMetrics;
use anyhow::{Context, Result};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::Router;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

pub const CONFIG_PATH: &str = "/config";
pub const METRICS_PATH: &str = "/metrics";
pub const KEY_LOG_LEVEL: &str = "log-level";

/// Longest time a request may take before it is answered with 408
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Routes of the sidecar endpoint
pub fn router(metrics: Arc<ReaperMetrics>) -> Router {
    let routes = Router::new()
        .route(CONFIG_PATH, put(config_handler))
        .route(METRICS_PATH, get(metrics_handler))
        .fallback(ready_handler)
        .with_state(metrics);
    with_request_timeout(routes, REQUEST_TIMEOUT)
}

/// Bound the time spent on each request
pub fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(TimeoutLayer::new(timeout))
}

/// Listen address for `addr`; a bare `:port` listens on every interface
pub fn listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Answers `ready` to any request without a more specific route
async fn ready_handler(method: Method, uri: Uri) -> &'static str {
    log::debug!("Request {method} {uri}");
    "ready"
}

async fn metrics_handler(State(metrics): State<Arc<ReaperMetrics>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], metrics.render())
}

/// `PUT /config?log-level=<name>`: 204 when applied, an empty 400 otherwise
async fn config_handler(
    uri: Uri,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> StatusCode {
    log::debug!("Request PUT {uri}");
    let params = match query {
        Ok(Query(params)) => params,
        Err(e) => {
            log::error!("Request PUT {uri} failed: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    let requested = params
        .into_iter()
        .find_map(|(key, value)| (key == KEY_LOG_LEVEL).then_some(value))
        .unwrap_or_default();
    match requested.parse::<LogLevel>() {
        Ok(level) => {
            level.apply();
            log::info!("Log level set to {level}");
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            log::error!("Request PUT {uri} failed: {e:#}");
            StatusCode::BAD_REQUEST
        }
    }
}

/// Serve on an already bound listener until the runtime shuts down
pub async fn serve_on(listener: TcpListener, metrics: Arc<ReaperMetrics>) -> Result<()> {
    axum::serve(listener, router(metrics))
        .await
        .context("Server failed")
}

/// Bind `addr` and serve
pub async fn serve(addr: &str, metrics: Arc<ReaperMetrics>) -> Result<()> {
    let addr = listen_addr(addr);
    let listener = TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("Failed to listen on {addr:?}"))?;
    log::info!("Server listening on {addr:?}");
    serve_on(listener, metrics).await
}

fn serve_blocking(addr: &str, metrics: Arc<ReaperMetrics>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build server runtime")?;
    runtime.block_on(serve(addr, metrics))
}

/// Run the server on its own thread with a dedicated runtime.
///
/// The server failing is fatal to the whole process.
pub fn spawn(addr: String, metrics: Arc<ReaperMetrics>) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("http".into())
        .spawn(move || {
            if let Err(e) = serve_blocking(&addr, metrics) {
                log::error!("Server on {addr:?} failed: {e:#}");
                eprintln!("Fatal error: server on {addr:?} failed: {e:#}");
                process::exit(1);
            }
        })
        .context("Failed to start server thread")
}
