//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, body limits, request ID)
//! - Own the outbound pool and the memory monitor for the server's lifetime
//! - Forward `/proxy/{target}` requests and relay the responses
//! - Ordered teardown: stop the monitor and drain, cut off open responses
//!   after `timeouts.shutdown_grace_secs`, then close the pool

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::ProxyConfig;
use crate::http::error::ProxyError;
use crate::http::request::build_outbound;
use crate::http::response::relay;
use crate::lifecycle::Shutdown;
use crate::memory::MemoryMonitor;
use crate::observability::metrics;
use crate::upstream::{ClientPool, PoolError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub pool: Arc<ClientPool>,
    pub monitor: Arc<MemoryMonitor>,
}

impl AppState {
    /// Create the outbound pool and a monitor sampling this process.
    pub fn new(config: ProxyConfig) -> Result<Self, PoolError> {
        let pool = Arc::new(ClientPool::new(config.pool.clone(), config.timeouts.clone()));
        pool.create()?;
        let monitor = Arc::new(MemoryMonitor::new(pool.clone(), config.memory.clone()));
        Ok(Self {
            config: Arc::new(config),
            pool,
            monitor,
        })
    }
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server with a fresh outbound pool.
    pub fn new(config: ProxyConfig) -> Result<Self, PoolError> {
        Ok(Self::with_state(AppState::new(config)?))
    }

    /// Create a server around pre-built state.
    pub fn with_state(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let body_limit = state.config.forwarding.max_body_size;

        Router::new()
            .route("/proxy/{*target}", any(proxy_handler))
            .route("/health", get(health_handler))
            .merge(setup_admin_router(state.clone()))
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serve until `shutdown` fires, then tear down in order.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let monitor_shutdown = Shutdown::new();
        let monitor_task = if self.state.config.memory.enabled {
            let monitor = self.state.monitor.clone();
            Some(tokio::spawn(monitor.run(monitor_shutdown.subscribe())))
        } else {
            tracing::info!("Memory monitor disabled");
            None
        };

        let grace = self.state.config.timeouts.shutdown_grace();
        let stopping = monitor_shutdown.clone();
        let (draining_tx, draining_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
                stopping.trigger();
                let _ = draining_tx.send(());
            })
            .into_future();
        let mut serve = std::pin::pin!(serve);

        let drain_deadline = async {
            if draining_rx.await.is_err() {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(grace).await;
        };

        let drained = tokio::select! {
            result = &mut serve => Some(result),
            _ = drain_deadline => None,
        };

        let result = match drained {
            Some(result) => result,
            None => {
                tracing::warn!(
                    grace_secs = grace.as_secs_f64(),
                    in_flight = self.state.pool.current().map(|c| c.in_flight()).unwrap_or(0),
                    "Drain deadline passed, cutting off open responses"
                );
                self.state.pool.abort_in_flight();
                match tokio::time::timeout(grace, &mut serve).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!("Connections still open after abort, abandoning them");
                        Ok(())
                    }
                }
            }
        };

        monitor_shutdown.trigger();
        if let Some(task) = monitor_task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Memory monitor task failed");
            }
        }

        if !self.state.pool.shutdown().await {
            tracing::warn!("Outbound pool closed with requests still in flight");
        }

        tracing::info!("HTTP server stopped");
        result
    }
}

/// Forward one request to the target embedded in its path.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = match forward(&state, request, &request_id).await {
        Ok(response) => response,
        Err(e) => {
            if e.is_client_error() {
                tracing::warn!(request_id = %request_id, method = %method, error = %e, "Request rejected");
            } else {
                tracing::error!(request_id = %request_id, method = %method, error = %e, "Request failed");
            }
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

async fn forward(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> Result<Response, ProxyError> {
    // Pin the current handle; a concurrent hot swap does not affect this request.
    let client = state.pool.current().ok_or(ProxyError::NotReady)?;
    let forwarding = &state.config.forwarding;

    let outbound = build_outbound(request, forwarding).await?;
    let target = outbound.url.clone();

    tracing::info!(
        request_id = %request_id,
        method = %outbound.method,
        target_url = %target,
        body = outbound.body.kind(),
        generation = client.generation(),
        "Proxying request"
    );

    let (upstream, lease) = client.dispatch(outbound).await.map_err(|e| {
        tracing::debug!(request_id = %request_id, target_url = %target, error = ?e, "Dispatch failed");
        ProxyError::from(e)
    })?;

    tracing::debug!(
        request_id = %request_id,
        target_url = %target,
        status = upstream.status().as_u16(),
        "Upstream responded"
    );

    Ok(relay(upstream, lease, forwarding.chunk_size, &target))
}

/// Liveness with the current memory reading.
///
/// Always 200; a failed sample reports `memory_usage_mb` as null.
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (memory_usage_mb, timestamp) = match state.monitor.sample() {
        Ok(sample) => (Some(sample.rounded_mb()), sample.timestamp_secs()),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not sample memory");
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            (None, now)
        }
    };

    Json(serde_json::json!({
        "status": "healthy",
        "memory_usage_mb": memory_usage_mb,
        "timestamp": timestamp,
    }))
}
