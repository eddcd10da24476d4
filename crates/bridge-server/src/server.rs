//! `BridgeServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bridge_core::ConnectionId;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::api;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::store::SessionStore;
use crate::sweeper::spawn_sweeper;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_ws_session;

/// How long shutdown waits for push connections to deregister.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Sessions and the global event log.
    pub store: Arc<SessionStore>,
    /// Every open push connection.
    pub registry: Arc<ConnectionRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders the `/metrics` body.
    pub metrics: PrometheusHandle,
}

/// The sync bridge server.
pub struct BridgeServer {
    config: Arc<ServerConfig>,
    store: Arc<SessionStore>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl BridgeServer {
    /// Create a new server. Nothing is bound until [`listen`](Self::listen).
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let store = SessionStore::new(config.event_buffer_size, config.global_log_size);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .merge(api::routes())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and start serving, along with the expiry sweeper.
    ///
    /// Returns the bound address and a handle that completes once the
    /// server has stopped after [`graceful_shutdown`](Self::graceful_shutdown).
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let sweeper = spawn_sweeper(
            Arc::clone(&self.store),
            Duration::from_secs(self.config.sweep_interval_secs.max(1)),
            Duration::from_secs(self.config.session_timeout_secs),
            token.clone(),
        );

        info!(
            addr = %local_addr,
            event_buffer_size = self.config.event_buffer_size,
            session_timeout_secs = self.config.session_timeout_secs,
            "sync bridge listening"
        );

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
            if let Err(e) = sweeper.await {
                warn!(error = %e, "sweeper task failed");
            }
            info!("listener closed");
        });

        Ok((local_addr, handle))
    }

    /// Stop accepting connections, close every push connection with 1001,
    /// wait for `handles`, then drop all sessions.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let _ = self.shutdown.graceful_shutdown(handles, timeout).await;
        if !self.registry.wait_drained(CONNECTION_DRAIN_TIMEOUT).await {
            warn!(
                remaining = self.registry.count(),
                "push connections still open after shutdown"
            );
        }
        self.store.shutdown();
        info!("sync bridge stopped");
    }

    /// Get the session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.count(),
        state.store.session_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// GET /ws
///
/// Upgrades are refused with 503 once shutdown has begun.
async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        debug!("refusing push connection during shutdown");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let connection_id = ConnectionId::new();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, connection_id, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::detached_handle;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> BridgeServer {
        BridgeServer::new(ServerConfig::default(), detached_handle())
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.store().session_count(), 0);
        assert_eq!(server.registry().count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server();
        let _ = server.store().create_session();

        let resp = get(server.router(), "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["sessions"], 1);
        assert_eq!(parsed["connections"], 0);
        assert!(parsed["timestamp"].is_number());
        assert!(parsed["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_responds() {
        let resp = get(make_server().router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_endpoint_requires_upgrade() {
        let resp = get(make_server().router(), "/ws").await;
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn ws_endpoint_refuses_upgrades_after_shutdown() {
        let server = make_server();
        server.shutdown().shutdown();
        let req = Request::builder()
            .uri("/ws")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(server.registry().count(), 0);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = get(make_server().router(), "/nonexistent").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_then_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        let _ = server.store().create_session();

        server
            .graceful_shutdown(vec![handle], Some(Duration::from_secs(5)))
            .await;
        assert!(server.shutdown().is_shutting_down());
        assert_eq!(server.store().session_count(), 0);
    }
}
