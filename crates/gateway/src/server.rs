//! axum server: upgrades requests to WebSockets and runs a session for each.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use proto::{GatewayError, MultiValueHeaders, TransportError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::invoker::{HandlerInvoker, LambdaHandler};
use crate::management::ManagementClient;
use crate::registry::BackChannelRegistry;
use crate::session::ConnectionSession;

/// Default path the WebSocket endpoint is served on.
pub const DEFAULT_WS_PATH: &str = "/";

/// Runs a handler against real WebSocket connections.
///
/// Every upgraded connection gets its own session task; all sessions share
/// one [`BackChannelRegistry`], which is also what [`ManagementClient`]
/// writes through.
#[derive(Clone)]
pub struct WebsocketAdapter {
    invoker: HandlerInvoker,
    registry: Arc<BackChannelRegistry>,
    ws_path: String,
}

struct AdapterState {
    invoker: HandlerInvoker,
    registry: Arc<BackChannelRegistry>,
}

impl WebsocketAdapter {
    /// Creates an adapter invoking `handler`, sharing `registry` with any
    /// [`ManagementClient`] built from it.
    pub fn new(handler: LambdaHandler, registry: Arc<BackChannelRegistry>) -> Self {
        Self {
            invoker: HandlerInvoker::new(handler),
            registry,
            ws_path: DEFAULT_WS_PATH.to_string(),
        }
    }

    /// Overrides the per-invocation handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.invoker = self.invoker.with_timeout(timeout);
        self
    }

    /// Serves the WebSocket endpoint on `path` instead of `/`.
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    pub fn registry(&self) -> &Arc<BackChannelRegistry> {
        &self.registry
    }

    /// Management client writing through this adapter's registry.
    pub fn management_client(&self) -> ManagementClient {
        ManagementClient::new(Arc::clone(&self.registry))
    }

    /// Builds the axum router: the WebSocket endpoint plus `/health`.
    pub fn router(&self) -> Router {
        let state = Arc::new(AdapterState {
            invoker: self.invoker.clone(),
            registry: Arc::clone(&self.registry),
        });

        Router::new()
            .route("/health", get(health_handler))
            .route(&self.ws_path, get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Binds `addr` and serves until `shutdown` resolves.
    pub async fn bind_and_serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// Open sessions are not interrupted by shutdown.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), GatewayError> {
        let local = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(addr = %local, path = %self.ws_path, "WebSocket adapter listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Serve(e.to_string()))?;

        info!("WebSocket adapter stopped");
        Ok(())
    }
}

// ─── Axum handlers ─────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AdapterState>>,
) -> impl IntoResponse {
    let headers = multi_value_headers(&headers);

    ws.on_failed_upgrade(|e: axum::Error| {
        warn!(error = %TransportError::Handshake(e.to_string()), "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| async move {
        let session = ConnectionSession::new(
            socket,
            headers,
            state.invoker.clone(),
            Arc::clone(&state.registry),
        );
        match session.run().await {
            Ok(summary) => debug!(
                connection_id = %summary.connection_id,
                end = ?summary.end,
                "Session finished"
            ),
            Err(e) => warn!(error = %e, "Session aborted before CONNECT"),
        }
    })
}

// ─── Helpers ───────────────────────────────────────────────

/// Collects request headers under their canonical names.
fn multi_value_headers(headers: &HeaderMap) -> MultiValueHeaders {
    let mut collected = MultiValueHeaders::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            debug!(header = %name, "Skipping non-text header value");
            continue;
        };
        collected
            .entry(canonical_header_name(name.as_str()))
            .or_default()
            .push(value.to_string());
    }
    collected
}

/// Canonical MIME header form: `sec-websocket-key` → `Sec-Websocket-Key`.
fn canonical_header_name(name: &str) -> String {
    let mut upper_next = true;
    name.chars()
        .map(|c| {
            let mapped = if upper_next {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper_next = c == '-';
            mapped
        })
        .collect()
}

// ─── Tests ─────────────────────────────────────────────────
