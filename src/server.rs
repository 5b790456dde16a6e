use crate::config::{Config, Environment};
use crate::gateway::{Gateway, GatewayResponse};
use crate::rate_limit::SlidingWindowLimiter;
use crate::relay::SmtpRelay;
use crate::request::GatewayRequest;
use crate::statistics::StatisticsCollector;
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub fn router(gateway: Arc<Gateway>, endpoint_path: &str, max_body_bytes: usize) -> Router {
    Router::new()
        .route(endpoint_path, any(submission_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(gateway)
}

async fn submission_handler(
    State(gateway): State<Arc<Gateway>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = GatewayRequest {
        method: method.as_str().to_string(),
        origin: header(&headers, "origin"),
        referer: header(&headers, "referer"),
        forwarded_for: header(&headers, "x-forwarded-for"),
        remote_addr: Some(peer),
        body: body.to_vec(),
    };

    gateway.handle(&request).await.into_response()
}

/// Header value as text; values that are not valid UTF-8 count as absent.
fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

/// Wires the gateway from configuration and serves until Ctrl+C or SIGTERM.
pub async fn run(config: Config, environment: Environment) -> anyhow::Result<()> {
    let mode = environment.mode;
    log::info!("Deployment mode: {mode}");
    if !mode.enforces_origin() {
        log::warn!("Origin allow-list is NOT enforced ({mode} mode)");
    }
    if environment.credentials.is_none() {
        log::error!(
            "{} / {} not set; submissions will fail with a configuration error",
            Environment::USER_VAR,
            Environment::PASSWORD_VAR
        );
    }

    let limiter = Arc::new(SlidingWindowLimiter::new(
        config.rate_limit.max_attempts,
        config.rate_limit.window(),
    ));
    let relay = SmtpRelay::new(&config.relay, mode).context("Failed to set up SMTP relay")?;

    let mut gateway = Gateway::new(environment, &config.site, limiter.clone(), Arc::new(relay));
    let collector = config.statistics_interval().map(StatisticsCollector::new);
    if let Some(collector) = &collector {
        gateway = gateway.with_statistics(collector.recorder());
    }

    let sweeper = tokio::spawn({
        let limiter = limiter.clone();
        async move {
            let mut timer = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                timer.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    log::debug!("Dropped {removed} idle rate-limit records");
                }
            }
        }
    });

    let app = router(
        Arc::new(gateway),
        &config.server.endpoint_path,
        config.server.max_body_bytes,
    );

    let address = &config.server.listen_address;
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    log::info!(
        "Contact gateway listening on {} ({})",
        listener.local_addr()?,
        config.server.endpoint_path
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.abort();
    if let Some(collector) = collector {
        collector.shutdown().await;
    }
    log::info!("Contact gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
