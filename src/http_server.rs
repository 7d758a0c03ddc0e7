use axum::{
    Router,
    extract::{ConnectInfo, Path, State},
    http::{Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::{
    assets::{Assets, PageData, resource},
    lookup::LookupService,
    rate_limiter::{Admission, RateLimiter},
    record::RecordType,
    stats::ServiceStats,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const RATE_LIMITED: &str = "API rate limit exceeded.";
const MISSING_TYPE: &str = "Missing 'type' parameter";
const MISSING_VALUE: &str = "Missing 'value' parameter";
const INVALID_TYPE: &str = "Invalid lookup-type - use A|AAAA|CNAME|MX|NS|PTR|SOA|TXT";

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_IP: &str = "x-ratelimit-ip";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_RATELIMIT_DELAY: &str = "x-ratelimit-delay";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Everything a request handler needs, passed explicitly to each handler
#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<LookupService>,
    /// Absent when no counter store is configured; every request is then admitted
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub stats: Arc<ServiceStats>,
    pub assets: Arc<Assets>,
}

impl AppState {
    pub fn new(
        lookup: Arc<LookupService>,
        rate_limiter: Option<Arc<RateLimiter>>,
        stats: Arc<ServiceStats>,
    ) -> Self {
        Self {
            lookup,
            rate_limiter,
            stats,
            assets: Arc::new(Assets::new()),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/robots.txt", get(robots))
        .route("/humans.txt", get(humans))
        .route("/favicon.ico", get(favicon))
        .route("/metrics", get(prometheus_metrics))
        .route("/{kind}/{value}", get(dns_lookup))
        .route("/{kind}/{value}/", get(dns_lookup))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for DNS lookups
pub struct HttpServer {
    state: AppState,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(state: AppState, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Bind and serve until Ctrl-C
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!("Launching the server on http://{}", listener.local_addr()?);

        let shutdown_signal = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        Self::serve(listener, self.state, shutdown_signal).await?;
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}

/// Client address used for rate limiting.
///
/// The first `X-Forwarded-For` entry wins so that clients behind a proxy are
/// counted individually; otherwise the peer address is used.
pub fn remote_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Check the path parameters before any resolution is attempted
pub fn validate_request(kind: &str, value: &str) -> Result<RecordType, &'static str> {
    if kind.is_empty() {
        return Err(MISSING_TYPE);
    }
    if value.is_empty() {
        return Err(MISSING_VALUE);
    }
    kind.parse::<RecordType>().map_err(|_| INVALID_TYPE)
}

fn plain_error(status: StatusCode, headers: HeaderMap, message: &str) -> Response {
    (
        status,
        headers,
        [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())],
        format!("{}\n", message),
    )
        .into_response()
}

/// Serialize with the five space indentation API clients already parse
fn pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"     ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    Ok(buffer)
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    match HeaderValue::from_str(&value.to_string()) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(e) => debug!("Skipping {} header: {}", name, e),
    }
}

fn rate_limit_headers(headers: &mut HeaderMap, client: &str, admission: &Admission) {
    insert_header(headers, X_RATELIMIT_LIMIT, admission.limit);
    insert_header(headers, X_RATELIMIT_IP, client);
    insert_header(headers, X_RATELIMIT_REMAINING, admission.remaining());
    insert_header(headers, X_RATELIMIT_DELAY, admission.retry_after.as_secs());
}

/// `GET /{type}/{value}`
async fn dns_lookup(
    State(state): State<AppState>,
    Path((kind, value)): Path<(String, String)>,
    request_headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );

    if let Some(limiter) = &state.rate_limiter {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client = remote_ip(&request_headers, peer);
        let admission = limiter.admit(&client).await;
        rate_limit_headers(&mut headers, &client, &admission);

        if !admission.allowed {
            return plain_error(StatusCode::TOO_MANY_REQUESTS, headers, RATE_LIMITED);
        }
    }

    let rtype = match validate_request(&kind, &value) {
        Ok(rtype) => rtype,
        Err(message) => {
            debug!("Rejected /{}/{}: {}", kind, value, message);
            return plain_error(StatusCode::NOT_FOUND, headers, message);
        }
    };

    let records = match state.lookup.lookup(&value, rtype).await {
        Ok(records) => records,
        Err(e) if e.is_nxdomain() => {
            debug!("{} {}: {}", rtype, value, e);
            Vec::new()
        }
        Err(e) => {
            warn!("Lookup of {} {} failed: {}", rtype, value, e);
            Vec::new()
        }
    };

    state.stats.record(rtype, !records.is_empty());

    let body = if records.is_empty() {
        pretty_json(&json!({ "error": "NXDOMAIN" }))
    } else {
        pretty_json(&records)
    };

    match body {
        Ok(body) => (
            StatusCode::OK,
            headers,
            [(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to serialize lookup result: {}", e);
            plain_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                "Failed to serialize lookup result",
            )
        }
    }
}

/// Front page, rendered for the host the client addressed
async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let hostname = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    let page = PageData {
        hostname,
        version: VERSION,
        redis: state.rate_limiter.is_some(),
    };

    match state.assets.render_index(&page) {
        Ok(html) => (
            [(header::CONTENT_TYPE, mime::TEXT_HTML_UTF_8.as_ref())],
            html,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render index page: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn serve_resource(name: &str) -> Response {
    match resource(name) {
        Some(found) => ([(header::CONTENT_TYPE, found.content_type)], found.body).into_response(),
        None => (StatusCode::NOT_FOUND, format!("{} not found\n", name)).into_response(),
    }
}

async fn robots() -> Response {
    serve_resource("robots.txt")
}

async fn humans() -> Response {
    serve_resource("humans.txt")
}

async fn favicon() -> Response {
    serve_resource("favicon.ico")
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match state.stats.export() {
        Ok(metrics) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())],
            metrics,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to export metrics".to_string(),
            )
                .into_response()
        }
    }
}
