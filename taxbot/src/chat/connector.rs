//! Chat-gateway seam and the loopback webhook adapter.
//!
//! The core only sees `MessageEnvelope` in and `OutboundRequest` out; the
//! session lifecycle (connect, authenticate, receive, send) lives behind
//! `ChatConnector`. The loopback adapter accepts inbound messages as JSON
//! POSTs guarded by a shared secret and forwards outbound messages to a
//! configured URL.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::post, Router};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector bind error: {0}")]
    Bind(String),
    #[error("connector not configured: {0}")]
    Config(String),
    #[error("outbound send failed: {0}")]
    Send(String),
}

/// One inbound chat message, as delivered by the gateway collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    /// Set for messages authored by automated identities, our own included.
    pub sender_is_bot: bool,
    pub text: String,
    pub timestamp: String,
}

/// One outbound message. `reply_to` carries the originating message id for
/// replies; plain sends leave it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub channel_id: String,
    pub content: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHandle {
    pub id: String,
    pub bind_addr: String,
}

pub type EnvelopeCallback = Arc<
    dyn Fn(MessageEnvelope) -> futures::future::BoxFuture<'static, Result<(), ConnectorError>>
        + Send
        + Sync,
>;

#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self) -> Result<ConnectionHandle, ConnectorError>;
    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), ConnectorError>;
    async fn subscribe(
        &self,
        handle: &ConnectionHandle,
        callback: EnvelopeCallback,
    ) -> Result<(), ConnectorError>;
    async fn send(
        &self,
        handle: &ConnectionHandle,
        outbound: OutboundRequest,
    ) -> Result<SendResult, ConnectorError>;
    async fn health(&self, handle: &ConnectionHandle) -> Result<HealthStatus, ConnectorError>;
}

#[derive(Debug, Clone)]
pub struct LoopbackConnectorConfig {
    pub bind_addr: String,
    pub shared_secret: String,
    /// Where outbound messages are POSTed. Sends fail when absent.
    pub outbound_url: Option<String>,
}

struct LoopbackConnectorState {
    config: LoopbackConnectorConfig,
    callback: RwLock<Option<EnvelopeCallback>>,
}

#[derive(Clone)]
pub struct LoopbackWebhookConnector {
    state: Arc<LoopbackConnectorState>,
    client: Client,
    server_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl LoopbackWebhookConnector {
    pub fn new(config: LoopbackConnectorConfig) -> Self {
        let state = LoopbackConnectorState {
            config,
            callback: RwLock::new(None),
        };
        Self {
            state: Arc::new(state),
            client: Client::new(),
            server_handle: Arc::new(Mutex::new(None)),
            shutdown_tx: Arc::new(Mutex::new(None)),
        }
    }

    async fn start_server(&self) -> Result<SocketAddr, ConnectorError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let mut guard = self.shutdown_tx.lock().await;
        *guard = Some(shutdown_tx);
        drop(guard);

        let state = self.state.clone();
        let router = Router::new()
            .route("/connector/inbound", post(inbound_handler))
            .with_state(state);

        let addr: SocketAddr = self
            .state
            .config
            .bind_addr
            .parse()
            .map_err(|_| ConnectorError::Bind("invalid bind_addr".to_string()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ConnectorError::Bind(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ConnectorError::Bind(e.to_string()))?;
        let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
            async move {
                let _ = shutdown_rx.await;
            },
        );

        let handle = tokio::spawn(async move {
            let _ = server.await;
        });

        let mut handle_guard = self.server_handle.lock().await;
        *handle_guard = Some(handle);
        Ok(local_addr)
    }
}

#[async_trait]
impl ChatConnector for LoopbackWebhookConnector {
    async fn connect(&self) -> Result<ConnectionHandle, ConnectorError> {
        let local_addr = self.start_server().await?;
        let handle = ConnectionHandle {
            id: Uuid::new_v4().to_string(),
            bind_addr: local_addr.to_string(),
        };
        info!(
            "[Connector] Ready as {} on {}",
            handle.id, handle.bind_addr
        );
        Ok(handle)
    }

    async fn disconnect(&self, _handle: &ConnectionHandle) -> Result<(), ConnectorError> {
        let mut guard = self.shutdown_tx.lock().await;
        if let Some(tx) = guard.take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        _handle: &ConnectionHandle,
        callback: EnvelopeCallback,
    ) -> Result<(), ConnectorError> {
        let mut guard = self.state.callback.write().await;
        *guard = Some(callback);
        Ok(())
    }

    async fn send(
        &self,
        _handle: &ConnectionHandle,
        outbound: OutboundRequest,
    ) -> Result<SendResult, ConnectorError> {
        let Some(outbound_url) = &self.state.config.outbound_url else {
            return Err(ConnectorError::Config("outbound URL not set".to_string()));
        };

        let resp = self
            .client
            .post(outbound_url)
            .json(&outbound)
            .send()
            .await
            .map_err(|e| ConnectorError::Send(e.to_string()))?;

        if !resp.status().is_success() {
            return Ok(SendResult {
                success: false,
                message_id: None,
                error: Some(format!("outbound returned status {}", resp.status())),
            });
        }

        Ok(SendResult {
            success: true,
            message_id: Some(Uuid::new_v4().to_string()),
            error: None,
        })
    }

    async fn health(&self, _handle: &ConnectionHandle) -> Result<HealthStatus, ConnectorError> {
        Ok(HealthStatus {
            ok: true,
            details: Some("loopback connector active".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InboundPayload {
    channel_id: String,
    sender_id: String,
    #[serde(default)]
    sender_is_bot: bool,
    text: String,
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct InboundResponse {
    accepted: bool,
    message_id: Option<String>,
    error: Option<String>,
}

async fn inbound_handler(
    State(state): State<Arc<LoopbackConnectorState>>,
    headers: HeaderMap,
    Json(payload): Json<InboundPayload>,
) -> impl IntoResponse {
    let secret = headers
        .get("x-taxbot-connector-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if secret != state.config.shared_secret {
        return (
            StatusCode::UNAUTHORIZED,
            Json(InboundResponse {
                accepted: false,
                message_id: None,
                error: Some("unauthorized".to_string()),
            }),
        );
    }

    let message_id = Uuid::new_v4().to_string();
    let envelope = MessageEnvelope {
        id: message_id.clone(),
        channel_id: payload.channel_id,
        sender_id: payload.sender_id,
        sender_is_bot: payload.sender_is_bot,
        text: payload.text,
        timestamp: payload.timestamp.unwrap_or_else(|| Utc::now().to_rfc3339()),
    };

    if let Some(callback) = state.callback.read().await.clone() {
        if let Err(e) = callback(envelope).await {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InboundResponse {
                    accepted: false,
                    message_id: None,
                    error: Some(format!("callback error: {}", e)),
                }),
            );
        }
    }

    (
        StatusCode::OK,
        Json(InboundResponse {
            accepted: true,
            message_id: Some(message_id),
            error: None,
        }),
    )
}
