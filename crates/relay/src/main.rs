mod auth;
mod config;
mod cors;
mod db;
mod error;
mod metrics;
mod store;
mod ws;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    auth::{identity::IdentityResolver, jwt::JwtAccessTokenService},
    config::{LogFormat, RelayConfig},
    db::pool::PoolConfig,
    error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
        ErrorCode, RelayError, REQUEST_ID_HEADER,
    },
    metrics::RelayMetrics,
    store::SocialStore,
    ws::{registry::ConnectionRegistry, SocketRouterState, SocketSettings},
};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();
    init_tracing(&config);

    if config.is_dev_jwt_secret() {
        warn!("using the development JWT secret; set FLOCK_RELAY_JWT_SECRET in production");
    }
    if config.socket_secret.is_none() {
        warn!("FLOCK_RELAY_SOCKET_SECRET is not set; the service identity is disabled");
    }

    let jwt_service = Arc::new(
        JwtAccessTokenService::new(&config.jwt_secret).context("invalid relay JWT secret")?,
    );
    let database_url = config
        .database_url
        .as_deref()
        .context("FLOCK_RELAY_DATABASE_URL must be set")?;
    let store = SocialStore::connect(database_url, PoolConfig::from_env())
        .await
        .context("failed to connect the relay store")?;

    let resolver = IdentityResolver::new(jwt_service, config.socket_secret.clone(), store.clone());
    let socket_state = SocketRouterState::new(
        resolver,
        store,
        ConnectionRegistry::default(),
        SocketSettings::from_config(&config),
    );

    let relay_metrics = Arc::new(RelayMetrics::default());
    metrics::set_global_metrics(Arc::clone(&relay_metrics));

    let app = build_router(socket_state, relay_metrics, config.cors_origins.as_deref());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting relay server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited unexpectedly")
}

fn init_tracing(config: &RelayConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_router(
    socket_state: SocketRouterState,
    relay_metrics: Arc<RelayMetrics>,
    cors_origins: Option<&str>,
) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .route("/metrics", get(move || render_metrics(Arc::clone(&relay_metrics))))
            .merge(ws::router(socket_state))
            .fallback(not_found),
    )
    .layer(cors::cors_layer(cors_origins))
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn render_metrics(relay_metrics: Arc<RelayMetrics>) -> Response {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        relay_metrics.render_prometheus(),
    )
        .into_response()
}

async fn not_found() -> RelayError {
    RelayError::new(ErrorCode::NotFound, "route not found")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(?error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(?error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            RelayError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    if let Ok(header) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, header);
    }

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    let latency_ms = started_at.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    metrics::record_http_request(method.as_str(), &path, status, latency_ms);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status,
        latency_ms,
        "request completed"
    );

    response
}
