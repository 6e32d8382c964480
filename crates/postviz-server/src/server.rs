//! Web server entrypoints live here.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{CorsConfig, ServerConfig, parse_header, parse_method};
use crate::provider::{GenerationProvider, ProviderError, RegenerationMode};

const HEALTHZ_PATH: &str = "/v1/healthz";
const RECORD_PATH: &str = "/v1/visualizations/{slug}";
const GENERATE_PATH: &str = "/v1/visualizations/{slug}/generate";
const SCAN_PATH: &str = "/v1/visualizations/scan";
const HEALTHZ_STATUS: &str = "ok";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_AFTER_SECS: &str = "10";
const ERROR_NOT_FOUND: &str = "not_found";
const ERROR_RATE_LIMITED: &str = "rate_limited";
const ERROR_INTERNAL: &str = "internal_server_error";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("invalid CORS configuration: {0}")]
    InvalidCors(String),
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone)]
struct ApiState {
    provider: Arc<dyn GenerationProvider>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

type ApiStateHandle = Arc<ApiState>;

#[derive(Debug, Deserialize)]
struct GenerateQuery {
    #[serde(default)]
    mode: Option<RegenerationMode>,
}

#[derive(Debug, Deserialize)]
struct ScanQuery {
    #[serde(default)]
    mode: Option<RegenerationMode>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Bare API router without middleware or rate limiting; used directly by
/// router-level tests.
pub fn build_api_router(provider: Arc<dyn GenerationProvider>) -> Router {
    debug_assert!(HEALTHZ_PATH.starts_with("/v1/"));

    let state = Arc::new(ApiState {
        provider,
        limiter: None,
    });
    api_router(state)
}

fn api_router(state: ApiStateHandle) -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(RECORD_PATH, get(get_record))
        .route(GENERATE_PATH, post(generate))
        .route(SCAN_PATH, post(scan))
        .with_state(state)
}

pub async fn serve(
    config: &ServerConfig,
    provider: Arc<dyn GenerationProvider>,
) -> Result<(), ServerError> {
    debug_assert!(config.listen_addr.len() <= 128);
    debug_assert!(!config.listen_addr.contains('\n'));

    let listen_addr = parse_listen_addr(&config.listen_addr)?;
    let listener = bind_listener(listen_addr).await?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "postviz server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);
    let shutdown_future = broadcast_shutdown(shutdown_tx);

    let app = build_app_router(config, provider)?;

    let mut server_future = Box::pin(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_future)
            .await
    });

    let drain_rx = shutdown_rx.clone();
    let mut drain_timeout = Box::pin(drain_timeout_future(drain_rx));

    tokio::select! {
        result = server_future.as_mut() => {
            if let Err(source) = result {
                return Err(ServerError::Serve { source });
            }
        }
        _ = drain_timeout.as_mut() => {
            // Timeout elapsed; dropping the server future forces termination.
        }
    }

    let final_event = *shutdown_rx.borrow();
    if final_event == ShutdownEvent::Pending {
        tracing::info!("server stopped without external shutdown signal");
    } else {
        tracing::info!(?final_event, "server shutdown complete");
    }

    Ok(())
}

fn build_app_router(
    config: &ServerConfig,
    provider: Arc<dyn GenerationProvider>,
) -> Result<Router, ServerError> {
    let limiter = config.rate_limit.enabled.then(|| {
        Arc::new(RateLimiter::direct(
            Quota::per_minute(config.rate_limit.trigger_per_minute)
                .allow_burst(config.rate_limit.burst),
        ))
    });
    let state = Arc::new(ApiState { provider, limiter });

    let mut router = api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            MakeRequestUuid,
        ));

    if config.cors.enabled {
        router = router.layer(build_cors_layer(&config.cors)?);
    }
    Ok(router)
}

fn build_cors_layer(config: &CorsConfig) -> Result<CorsLayer, ServerError> {
    let origins = config
        .allow_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|_| ServerError::InvalidCors(format!("invalid origin `{origin}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let methods = config
        .allow_methods
        .iter()
        .map(|method| parse_method(method).map_err(ServerError::InvalidCors))
        .collect::<Result<Vec<_>, _>>()?;

    let headers = config
        .allow_headers
        .iter()
        .map(|header| parse_header(header).map_err(ServerError::InvalidCors))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::list(headers))
        .max_age(Duration::from_secs(config.max_age_secs)))
}

async fn healthz() -> impl IntoResponse {
    debug_assert_eq!(HEALTHZ_STATUS, "ok");

    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
    })
}

async fn get_record(
    State(state): State<ApiStateHandle>,
    Path(slug): Path<String>,
) -> Response {
    match state.provider.record_by_slug(&slug).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            ERROR_NOT_FOUND,
            format!("no visualization record for slug `{slug}`"),
        ),
        Err(error) => provider_error_response(error),
    }
}

async fn generate(
    State(state): State<ApiStateHandle>,
    Path(slug): Path<String>,
    Query(query): Query<GenerateQuery>,
) -> Response {
    if let Some(limited) = check_rate_limit(&state) {
        return limited;
    }

    let mode = query.mode.unwrap_or(RegenerationMode::Regenerate);
    match state.provider.generate(&slug, mode).await {
        Ok(report) => Json(report).into_response(),
        Err(error) => provider_error_response(error),
    }
}

async fn scan(State(state): State<ApiStateHandle>, Query(query): Query<ScanQuery>) -> Response {
    if let Some(limited) = check_rate_limit(&state) {
        return limited;
    }

    let mode = query.mode.unwrap_or(RegenerationMode::FillMissing);
    match state.provider.scan(mode, query.limit).await {
        Ok(report) => Json(report).into_response(),
        Err(error) => provider_error_response(error),
    }
}

fn check_rate_limit(state: &ApiState) -> Option<Response> {
    let limiter = state.limiter.as_ref()?;
    if limiter.check().is_ok() {
        return None;
    }

    let mut response = error_response(
        StatusCode::TOO_MANY_REQUESTS,
        ERROR_RATE_LIMITED,
        "generation trigger rate limit exceeded".to_string(),
    );
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
    Some(response)
}

fn provider_error_response(error: ProviderError) -> Response {
    match error {
        ProviderError::NotFound(message) => {
            error_response(StatusCode::NOT_FOUND, ERROR_NOT_FOUND, message)
        }
        ProviderError::Internal(message) => {
            tracing::error!(%message, "provider failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, ERROR_INTERNAL, message)
        }
    }
}

fn error_response(status: StatusCode, code: &'static str, message: String) -> Response {
    (status, Json(ErrorBody { error: code, message })).into_response()
}

async fn wait_for_shutdown() -> ShutdownEvent {
    debug_assert!(DRAIN_TIMEOUT >= Duration::from_secs(1));

    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

fn broadcast_shutdown(
    sender: watch::Sender<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    debug_assert!(!sender.is_closed());
    async move {
        let event = wait_for_shutdown().await;
        debug_assert!(event != ShutdownEvent::Pending);
        if let Err(error) = sender.send(event) {
            tracing::warn!(?event, %error, "failed to broadcast shutdown event");
        }
    }
}

fn drain_timeout_future(
    mut receiver: watch::Receiver<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        if receiver.changed().await.is_ok() {
            let event = *receiver.borrow_and_update();
            debug_assert!(event != ShutdownEvent::Pending);
            tracing::info!(?event, "shutdown signal received; draining connections");
            tokio::time::sleep(DRAIN_TIMEOUT).await;
            tracing::warn!(
                ?event,
                seconds = DRAIN_TIMEOUT.as_secs(),
                "graceful shutdown timed out; continuing shutdown"
            );
        }
    }
}
