use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use courier_proto::WsMessage;

/// Server URL: checked at compile time via env!, falls back to runtime env var, then default
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:9001";

/// Internal message type for the write channel
enum WriteMessage {
    Data(String),
    Close,
}

/// Connection lifecycle and server pushes, surfaced to the embedding app.
///
/// `Connected` means the gap just ended: anything pushed while away is gone,
/// so the app refetches history and friend state instead of waiting for a
/// replay that will never come.
#[derive(Debug)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Push(WsMessage),
}

/// WebSocket client that connects to the central Courier server
pub struct SocketClient {
    server_url: Arc<TokioMutex<String>>,
    /// std::sync::Mutex so write access works from sync command paths
    write_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<WriteMessage>>>>,
    connected: Arc<TokioMutex<bool>>,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for SocketClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketClient {
    pub fn new() -> Self {
        // Priority: build-time env -> runtime env -> default
        let build_time_url = option_env!("COURIER_SERVER_URL");
        let runtime_url = std::env::var("COURIER_SERVER_URL").ok();

        let server_url = build_time_url
            .map(String::from)
            .or(runtime_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        info!(url = %server_url, "Using Courier server URL");

        Self::with_url(server_url)
    }

    /// Client pointed at a specific server, for tests and custom deployments.
    pub fn with_url(server_url: String) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            server_url: Arc::new(TokioMutex::new(server_url)),
            write_tx: Arc::new(StdMutex::new(None)),
            connected: Arc::new(TokioMutex::new(false)),
            shutdown_tx,
        }
    }

    /// Get the server URL
    pub async fn get_server_url(&self) -> String {
        self.server_url.lock().await.clone()
    }

    /// Check if connected and authenticated
    pub async fn is_connected(&self) -> bool {
        *self.connected.lock().await
    }

    /// Connect to the central server and keep the connection alive.
    ///
    /// Returns this client's event stream. The background loop redials with
    /// a 3 second delay after every drop until [`SocketClient::disconnect`]
    /// is called or the receiver is dropped.
    pub async fn connect(&self, token: &str) -> mpsc::UnboundedReceiver<ClientEvent> {
        let server_url = self.server_url.lock().await.clone();
        let token = token.to_string();
        let write_tx = self.write_tx.clone();
        let connected = self.connected.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let (events, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                // Check for shutdown before attempting connection
                if shutdown_rx.try_recv().is_ok() {
                    info!("Shutdown signal received, stopping reconnection");
                    break;
                }

                info!(url = %server_url, "Connecting to Courier server");

                match connect_async(&server_url).await {
                    Ok((ws_stream, _)) => {
                        let (mut ws_write, mut ws_read) = ws_stream.split();

                        // Send Connect message
                        let connect_msg = WsMessage::Connect {
                            token: token.clone(),
                        };
                        let connect_json = serde_json::to_string(&connect_msg).unwrap();

                        if ws_write
                            .send(Message::Text(connect_json.into()))
                            .await
                            .is_err()
                        {
                            error!("Failed to send connect message");
                            tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
                            continue;
                        }

                        // Wait for auth response
                        let mut authenticated = false;
                        if let Some(Ok(Message::Text(response))) = ws_read.next().await {
                            match serde_json::from_str::<WsMessage>(&response) {
                                Ok(WsMessage::AuthResponse { success, message }) => {
                                    if success {
                                        info!("Authenticated with server: {}", message);
                                        authenticated = true;
                                    } else {
                                        error!("Authentication failed: {}", message);
                                    }
                                }
                                _ => {
                                    warn!("Unexpected response during auth");
                                }
                            }
                        }
                        if !authenticated {
                            tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
                            continue;
                        }

                        // The write channel must be in place before Connected
                        // fires; apps send as soon as they see the event
                        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
                        {
                            let mut guard = write_tx.lock().unwrap();
                            *guard = Some(tx);
                        }
                        *connected.lock().await = true;

                        if events.send(ClientEvent::Connected).is_err() {
                            // Nobody is listening anymore
                            write_tx.lock().unwrap().take();
                            *connected.lock().await = false;
                            break;
                        }

                        // Message loop
                        let mut should_reconnect = true;
                        loop {
                            tokio::select! {
                                // Check for shutdown signal
                                _ = shutdown_rx.recv() => {
                                    info!("Shutdown signal received, closing connection gracefully");
                                    if let Err(e) = ws_write.send(Message::Close(None)).await {
                                        warn!(error = %e, "Failed to send close frame");
                                    }
                                    should_reconnect = false;
                                    break;
                                }
                                // Send outgoing messages
                                Some(msg) = rx.recv() => {
                                    match msg {
                                        WriteMessage::Data(data) => {
                                            if ws_write.send(Message::Text(data.into())).await.is_err() {
                                                error!("Failed to send message to server");
                                                break;
                                            }
                                        }
                                        WriteMessage::Close => {
                                            info!("Close requested, sending close frame");
                                            if let Err(e) = ws_write.send(Message::Close(None)).await {
                                                warn!(error = %e, "Failed to send close frame");
                                            }
                                            should_reconnect = false;
                                            break;
                                        }
                                    }
                                }
                                // Surface incoming pushes to the embedding app
                                msg = ws_read.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            match serde_json::from_str::<WsMessage>(&text) {
                                                Ok(event) => {
                                                    if events.send(ClientEvent::Push(event)).is_err() {
                                                        should_reconnect = false;
                                                        break;
                                                    }
                                                }
                                                Err(e) => {
                                                    warn!(error = %e, "Unparseable frame from server");
                                                }
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None => {
                                            info!("Server closed connection");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            error!(error = %e, "WebSocket error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }

                        // Cleanup
                        {
                            let mut guard = write_tx.lock().unwrap();
                            *guard = None;
                        }
                        *connected.lock().await = false;
                        let _ = events.send(ClientEvent::Disconnected);
                        info!("Disconnected from Courier server");

                        if !should_reconnect {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, url = %server_url, "Failed to connect to Courier server");
                    }
                }

                // Reconnect after delay
                debug!("Reconnecting in 3 seconds");
                tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
            }
        });

        events_rx
    }

    /// Gracefully disconnect from the server
    pub fn disconnect(&self) {
        info!("Initiating graceful disconnect");
        // Signal shutdown to stop reconnection loop
        let _ = self.shutdown_tx.send(());
        // Also send close message through the channel if connected
        if let Ok(guard) = self.write_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(WriteMessage::Close);
            }
        }
    }

    /// Send a frame to the server
    pub fn send(&self, message: WsMessage) -> Result<(), String> {
        let json = serde_json::to_string(&message).map_err(|e| e.to_string())?;
        debug!(preview = %&json[..100.min(json.len())], "Sending message to server");

        let guard = self
            .write_tx
            .lock()
            .map_err(|e| format!("Lock poisoned: {}", e))?;

        if let Some(tx) = guard.as_ref() {
            tx.send(WriteMessage::Data(json))
                .map_err(|e| format!("Failed to send to server: {}", e))?;
            Ok(())
        } else {
            // Frames sent while offline are lost; history recovers messages
            warn!("Cannot send message: not connected to server");
            Err("Not connected to server".to_string())
        }
    }
}
