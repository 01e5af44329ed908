//! Axum web server: WebSocket sessions, health, and front-end assets.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::hub::HubStatus;
use crate::runner::{spawn_hub, HubHandle};
use crate::session::outbox;

/// Shared application state.
pub struct AppState {
    hub: HubHandle,
    started: Instant,
}

/// The Blobfield server: a running hub plus its HTTP front.
pub struct BlobfieldServer {
    config: ServerConfig,
    state: Arc<AppState>,
    hub_task: JoinHandle<()>,
}

impl BlobfieldServer {
    /// Start the hub and its clock. Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let (hub, hub_task) = spawn_hub(config.hub.clone());
        Self {
            config,
            state: Arc::new(AppState {
                hub,
                started: Instant::now(),
            }),
            hub_task,
        }
    }

    /// Handle to the running hub.
    pub fn hub(&self) -> HubHandle {
        self.state.hub.clone()
    }

    /// Build the router for the server.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.addr).await?;
        self.serve_on(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await
    }

    /// Serve on an existing listener until `shutdown` resolves.
    ///
    /// On shutdown the hub stops first, closing every session socket, and
    /// then the HTTP server drains.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!("Blobfield listening on http://{}", addr);
        info!("  Assets: {:?}", self.config.static_dir);

        let router = self.router();
        let hub = self.hub();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                hub.shutdown();
            })
            .await?;

        self.state.hub.shutdown();
        if let Err(e) = self.hub_task.await {
            warn!("Hub task ended abnormally: {}", e);
        }
        info!("Blobfield stopped");
        Ok(())
    }
}

/// Health response. Read-only view of the hub.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    #[serde(flatten)]
    hub: HubStatus,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.hub.status().await {
        Ok(hub) => Json(HealthResponse {
            status: "ok",
            uptime_secs: state.started.elapsed().as_secs(),
            hub,
        })
        .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "stopped" })),
        )
            .into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

fn close(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

async fn handle_socket(mut socket: WebSocket, hub: HubHandle) {
    let (tx, mut outbound) = outbox();

    let id = match hub.connect(tx).await {
        Ok(id) => id,
        Err(Error::CapacityExceeded(full)) => {
            warn!("Refusing connection: {}", full);
            let _ = socket.send(close(full.close_code(), full.reason())).await;
            return;
        }
        Err(e) => {
            warn!("Refusing connection: {}", e);
            let _ = socket.send(close(close_code::AWAY, "server shutting down")).await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    // Writer: hub messages out as JSON text frames. Ends when the hub drops
    // the session or the socket stops accepting writes.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode {}: {}", message.kind(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(close(close_code::AWAY, "server shutting down")).await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if hub.inbound(id, text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %id, "WebSocket error: {}", e);
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    let _ = hub.disconnect(id);
    writer.abort();
}
