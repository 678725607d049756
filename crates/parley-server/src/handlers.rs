//! Connection handlers for Parley server.
//!
//! This module handles the connection lifecycle and message processing.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parley_core::{ConnectionHandle, Gateway, JwtAuthenticator, LocalRegistry, MemoryUserStore};
use parley_transport::{websocket, ConnectionId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The connection gateway.
    pub gateway: Gateway,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let authenticator =
            JwtAuthenticator::new(config.auth.secret.as_bytes(), config.auth.token_ttl());
        let users = MemoryUserStore::with_users(config.users.iter().cloned());

        Self {
            gateway: Gateway::new(
                Arc::new(LocalRegistry::new()),
                Arc::new(authenticator),
                Arc::new(users),
            ),
            config,
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Parley server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Welcome to Parley",
        "websocket": state.config.transport.websocket_path,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let limit = state.config.limits.max_connections;
    if state.gateway.registry().len() >= limit {
        warn!(peer = %addr, limit, "Connection limit reached, refusing upgrade");
        metrics::record_rejection();
        return (StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached").into_response();
    }

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, addr, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    let (sink, mut reader, writer) = websocket::split(socket, &connection_id);

    let connection = state.gateway.connect(ConnectionHandle::with_id(
        connection_id,
        addr.ip().to_string(),
        sink,
    ));

    // One frame at a time keeps replies in arrival order
    loop {
        let text = match reader.recv().await {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(e) => {
                debug!(connection = %connection.id(), error = %e, "Read failed");
                metrics::record_error("websocket");
                break;
            }
        };

        let start = Instant::now();
        metrics::record_message(text.len(), "inbound");

        match state.gateway.handle_text(&connection, &text).await {
            Ok(outcome) => metrics::record_outcome(&outcome),
            Err(e) => {
                debug!(connection = %connection.id(), error = %e, "Reply failed");
                metrics::record_error("send");
                break;
            }
        }

        metrics::record_latency(start.elapsed().as_secs_f64());
    }

    let report = state.gateway.disconnect(connection);
    metrics::record_broadcast(&report);

    // The writer drains what is queued, then closes the socket
    drop(writer);
}
