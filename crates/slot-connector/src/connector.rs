//! Remote spin provider: WebSocket/TCP link to the game server

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use slot_core::{MachineId, SpinOutcome, SpinRequest};
use slot_session::{ProviderError, SpinProvider};

use crate::protocol::{
    ConnectionConfig, ConnectionState, FRAME_HEARTBEAT, Protocol, ProtocolFrame,
};

type SpinReply = Result<SpinOutcome, ProviderError>;
type PendingMap = Arc<parking_lot::Mutex<HashMap<String, oneshot::Sender<SpinReply>>>>;

/// [`SpinProvider`] backed by a live server connection.
///
/// Requests are matched to responses by frame ID, so a late reply to a
/// request that already timed out is dropped.
pub struct RemoteSpinProvider {
    config: ConnectionConfig,

    state: Arc<RwLock<ConnectionState>>,

    /// Frames queued for the connection task
    outgoing: mpsc::Sender<ProtocolFrame>,

    /// Spin requests awaiting a response, by frame ID
    pending: PendingMap,

    connection_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,

    shutdown_tx: broadcast::Sender<()>,
}

/// Shared by the two transport loops
struct LinkContext {
    state: Arc<RwLock<ConnectionState>>,
    pending: PendingMap,
    outgoing_rx: mpsc::Receiver<ProtocolFrame>,
    shutdown_rx: broadcast::Receiver<()>,
    heartbeat: Option<tokio::time::Interval>,
}

impl RemoteSpinProvider {
    /// Open a connection as described by `config`
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ConnectorError> {
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let pending: PendingMap = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let (outgoing, outgoing_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let context = LinkContext {
            state: Arc::clone(&state),
            pending: Arc::clone(&pending),
            outgoing_rx,
            shutdown_rx,
            heartbeat: heartbeat_interval(config.heartbeat_ms),
        };

        let handle = match &config.protocol {
            Protocol::WebSocket { url } => Self::connect_websocket(&config, url, context).await,
            Protocol::Tcp { host, port } => {
                Self::connect_tcp(&config, host, *port, context).await
            }
        };
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                *state.write().await = ConnectionState::Error;
                return Err(e);
            }
        };

        *state.write().await = ConnectionState::Connected;
        log::info!("[Connector] Connected via {:?}", config.protocol);

        Ok(Self {
            config,
            state,
            outgoing,
            pending,
            connection_handle: parking_lot::Mutex::new(Some(handle)),
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Number of spin requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Close the connection. Outstanding spins fail with a transport error.
    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        *self.state.write().await = ConnectionState::Disconnecting;
        let _ = self.shutdown_tx.send(());

        let handle = self.connection_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("[Connector] Connection task ended abnormally: {}", e);
            }
        }

        fail_pending(&self.pending, "connection closed");
        *self.state.write().await = ConnectionState::Disconnected;
        log::info!("[Connector] Disconnected");
        Ok(())
    }

    async fn send_frame(&self, frame: ProtocolFrame) -> Result<(), ProviderError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProviderError::Unavailable);
        }
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| ProviderError::Transport("connection closed".into()))
    }

    // Internal connection methods

    async fn connect_websocket(
        config: &ConnectionConfig,
        url: &str,
        mut context: LinkContext,
    ) -> Result<JoinHandle<()>, ConnectorError> {
        let _ = url::Url::parse(url)
            .map_err(|e| ConnectorError::ConnectionFailed(format!("Invalid URL: {}", e)))?;

        let timeout = Duration::from_millis(config.timeout_ms as u64);
        let ws_stream = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| ConnectorError::Timeout)?
            .map_err(|e| ConnectorError::ConnectionFailed(format!("WebSocket error: {}", e)))?
            .0;

        let (mut write, mut read) = ws_stream.split();

        if let Some(token) = &config.auth_token {
            let json = encode(&ProtocolFrame::auth(token))?;
            write
                .send(Message::Text(json.into()))
                .await
                .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;
        }

        let handle = tokio::spawn(async move {
            let end_state = loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                handle_message(text.as_str(), &context.pending);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                break ConnectionState::Disconnected;
                            }
                            Some(Err(e)) => {
                                log::error!("[Connector] WebSocket error: {}", e);
                                break ConnectionState::Error;
                            }
                            _ => {} // ping/pong/binary
                        }
                    }

                    frame = context.outgoing_rx.recv() => {
                        let Some(frame) = frame else {
                            break ConnectionState::Disconnected;
                        };
                        let Ok(json) = encode(&frame) else { continue };
                        if write.send(Message::Text(json.into())).await.is_err() {
                            break ConnectionState::Error;
                        }
                    }

                    _ = next_heartbeat(&mut context.heartbeat) => {
                        if let Ok(json) = encode(&ProtocolFrame::heartbeat()) {
                            if write.send(Message::Text(json.into())).await.is_err() {
                                break ConnectionState::Error;
                            }
                        }
                    }

                    _ = context.shutdown_rx.recv() => {
                        let _ = write.send(Message::Close(None)).await;
                        break ConnectionState::Disconnected;
                    }
                }
            };
            context.close(end_state).await;
        });

        Ok(handle)
    }

    async fn connect_tcp(
        config: &ConnectionConfig,
        host: &str,
        port: u16,
        mut context: LinkContext,
    ) -> Result<JoinHandle<()>, ConnectorError> {
        let addr = format!("{}:{}", host, port);
        let timeout = Duration::from_millis(config.timeout_ms as u64);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectorError::Timeout)?
            .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;

        let (read_half, mut write_half) = stream.into_split();
        // `next_line` is cancel-safe, so a half-received frame survives a
        // heartbeat or an outgoing frame winning the select
        let mut lines = BufReader::new(read_half).lines();

        if let Some(token) = &config.auth_token {
            let json = encode(&ProtocolFrame::auth(token))?;
            write_half
                .write_all(format!("{}\n", json).as_bytes())
                .await
                .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;
        }

        let handle = tokio::spawn(async move {
            let end_state = loop {
                tokio::select! {
                    result = lines.next_line() => {
                        match result {
                            Ok(None) => break ConnectionState::Disconnected,
                            Ok(Some(line)) => {
                                handle_message(line.trim(), &context.pending);
                            }
                            Err(e) => {
                                log::error!("[Connector] TCP read error: {}", e);
                                break ConnectionState::Error;
                            }
                        }
                    }

                    frame = context.outgoing_rx.recv() => {
                        let Some(frame) = frame else {
                            break ConnectionState::Disconnected;
                        };
                        let Ok(json) = encode(&frame) else { continue };
                        if write_half.write_all(format!("{}\n", json).as_bytes()).await.is_err() {
                            break ConnectionState::Error;
                        }
                    }

                    _ = next_heartbeat(&mut context.heartbeat) => {
                        if let Ok(json) = encode(&ProtocolFrame::heartbeat()) {
                            if write_half.write_all(format!("{}\n", json).as_bytes()).await.is_err() {
                                break ConnectionState::Error;
                            }
                        }
                    }

                    _ = context.shutdown_rx.recv() => {
                        let _ = write_half.shutdown().await;
                        break ConnectionState::Disconnected;
                    }
                }
            };
            context.close(end_state).await;
        });

        Ok(handle)
    }
}

impl LinkContext {
    async fn close(self, end_state: ConnectionState) {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Disconnecting {
                *state = end_state;
            }
        }
        // After the state change, so no new request can slip in unanswered
        fail_pending(&self.pending, "connection closed");
        log::debug!("[Connector] Connection task finished: {:?}", end_state);
    }
}

#[async_trait]
impl SpinProvider for RemoteSpinProvider {
    async fn spin(&self, request: &SpinRequest) -> Result<SpinOutcome, ProviderError> {
        let id = uuid::Uuid::new_v4().to_string();
        let frame = ProtocolFrame::spin(&id, request)
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), reply_tx);
        // Removes the entry if this future is dropped (e.g. on timeout)
        let _pending = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        self.send_frame(frame).await?;
        reply_rx
            .await
            .unwrap_or_else(|_| Err(ProviderError::Transport("connection closed".into())))
    }

    async fn stop_auto_spin(&self, machine_id: &MachineId) -> Result<(), ProviderError> {
        self.send_frame(ProtocolFrame::stop_auto_spin(machine_id))
            .await
    }
}

struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

/// Route an incoming frame to the request waiting for it
fn handle_message(text: &str, pending: &PendingMap) {
    let frame: ProtocolFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            log::warn!("[Connector] Invalid JSON: {}", text);
            return;
        }
    };

    let id = frame.id.clone();
    let frame_type = frame.frame_type.clone();

    match (id, frame.into_spin_result()) {
        (Some(id), Some(result)) => match pending.lock().remove(&id) {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => log::warn!("[Connector] Response for unknown request {}", id),
        },
        (None, Some(Err(e))) => log::warn!("[Connector] Server error: {}", e),
        (None, Some(Ok(_))) => log::warn!("[Connector] Spin result without request ID"),
        (_, None) if frame_type == FRAME_HEARTBEAT => {}
        (_, None) => log::debug!("[Connector] Ignoring '{}' frame", frame_type),
    }
}

fn fail_pending(pending: &PendingMap, reason: &str) {
    let drained: Vec<_> = pending.lock().drain().collect();
    for (_, reply) in drained {
        let _ = reply.send(Err(ProviderError::Transport(reason.to_string())));
    }
}

fn encode(frame: &ProtocolFrame) -> Result<String, ConnectorError> {
    serde_json::to_string(frame).map_err(|e| ConnectorError::Protocol(e.to_string()))
}

fn heartbeat_interval(period_ms: u32) -> Option<tokio::time::Interval> {
    if period_ms == 0 {
        return None;
    }
    let period = Duration::from_millis(period_ms as u64);
    Some(tokio::time::interval_at(
        tokio::time::Instant::now() + period,
        period,
    ))
}

async fn next_heartbeat(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Connector builder
pub struct ConnectorBuilder {
    config: ConnectionConfig,
}

impl ConnectorBuilder {
    pub fn websocket(url: &str) -> Self {
        Self::with_protocol(Protocol::WebSocket {
            url: url.to_string(),
        })
    }

    pub fn tcp(host: &str, port: u16) -> Self {
        Self::with_protocol(Protocol::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// Builder for a `ws://`, `wss://` or `tcp://host:port` address
    pub fn from_url(address: &str) -> Result<Self, ConnectorError> {
        Protocol::from_url(address)
            .map(Self::with_protocol)
            .map_err(ConnectorError::ConnectionFailed)
    }

    fn with_protocol(protocol: Protocol) -> Self {
        Self {
            config: ConnectionConfig {
                protocol,
                ..ConnectionConfig::default()
            },
        }
    }

    pub fn auth(mut self, token: &str) -> Self {
        self.config.auth_token = Some(token.to_string());
        self
    }

    /// Connection timeout
    pub fn timeout(mut self, timeout_ms: u32) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    pub fn heartbeat(mut self, period_ms: u32) -> Self {
        self.config.heartbeat_ms = period_ms;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub async fn connect(self) -> Result<RemoteSpinProvider, ConnectorError> {
        RemoteSpinProvider::connect(self.config).await
    }
}

/// Connector errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
