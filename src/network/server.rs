//! WebSocket Game Server
//!
//! Accepts client connections, assigns each a fresh identity, feeds
//! inbound frames to the router, and runs the disconnect cleanup path
//! when a socket goes away, including sockets that just go silent past
//! the idle timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::ClientId;
use crate::network::notifier::{spawn_forwarder, Notifier};
use crate::network::protocol::{ClientRequest, ErrorReason, ServerMessage};
use crate::network::registry::ConnectionRegistry;
use crate::network::router::Router;
use crate::store::backend::KeyValueStore;
use crate::store::sessions::SessionStore;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for longer than this are dropped through the
    /// normal disconnect cleanup.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".parse().expect("static bind address"),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Default configuration with the listen port taken from the `PORT`
    /// environment variable when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.bind_addr.set_port(port);
        }
        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to the listen address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The game server: one per process.
///
/// Owns the process-local connection registry and a router wired to the
/// shared store and notifier handles it was constructed with.
pub struct GameServer {
    config: ServerConfig,
    router: Arc<Router>,
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<dyn Notifier>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over the shared store backend and notifier.
    pub fn new(
        config: ServerConfig,
        backend: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(Router::new(
            SessionStore::new(backend),
            registry.clone(),
            notifier.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            router,
            registry,
            notifier,
            shutdown_tx,
        }
    }

    /// Run the server until shutdown.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(version = %self.config.version, "game server listening");

        // One subscription per process; it outlives every connection.
        let forwarder = spawn_forwarder(self.notifier.clone(), self.registry.clone());

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.registry.len().await >= self.config.max_connections {
                                warn!(%addr, "connection limit reached, rejecting");
                                continue;
                            }
                            debug!(%addr, "new connection");
                            self.handle_connection(stream, addr);
                        }
                        Err(err) => {
                            error!(%err, "accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        forwarder.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection on its own task.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let router = self.router.clone();
        let idle_timeout = self.config.idle_timeout;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(err) => {
                    error!(%addr, %err, "websocket handshake failed");
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Fresh identity per connection; the client learns it from
            // the welcome message and echoes it in every payload.
            let client_id = ClientId::generate();
            registry.register(client_id, msg_tx.clone()).await;
            let _ = msg_tx
                .send(ServerMessage::Welcome {
                    client_id,
                    provoke_request: true,
                })
                .await;
            info!(%client_id, %addr, "client connected");

            // Writer task: serializes outbound messages onto the socket.
            let sender_task = tokio::spawn(async move {
                while let Some(message) = msg_rx.recv().await {
                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(err) => {
                            error!(%err, "failed to serialize outbound message");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                Self::handle_frame(&text, client_id, &router, &msg_tx).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(%client_id, "connection closed");
                                break;
                            }
                            Some(Err(err)) => {
                                warn!(%client_id, %err, "websocket error");
                                break;
                            }
                            // Ping/pong and binary frames carry no requests.
                            Some(Ok(_)) => {}
                        }
                    }
                    _ = tokio::time::sleep(idle_timeout) => {
                        info!(%client_id, "idle connection dropped");
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup runs while the registry entry still resolves, so a
            // dropped socket cannot orphan its session or binding.
            router.handle_disconnect(client_id).await;
            registry.unregister(client_id).await;
            sender_task.abort();
            info!(%client_id, %addr, "client disconnected");
        });
    }

    /// Parse and dispatch one inbound text frame.
    async fn handle_frame(
        text: &str,
        client_id: ClientId,
        router: &Router,
        msg_tx: &mpsc::Sender<ServerMessage>,
    ) {
        let request = match ClientRequest::from_json(text) {
            Ok(request) => request,
            Err(err) => {
                debug!(%client_id, %err, "unparseable frame");
                let _ = msg_tx
                    .send(ServerMessage::error(
                        ErrorReason::Malformed,
                        "invalid request",
                    ))
                    .await;
                return;
            }
        };

        // The id assigned at connect is authoritative; a payload naming
        // another client is refused without touching any state.
        if request.client_id() != client_id {
            let _ = msg_tx
                .send(ServerMessage::error(
                    ErrorReason::Malformed,
                    "client_id does not match this connection",
                ))
                .await;
            return;
        }

        router.handle(request).await;
    }

    /// Signal the server to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }
}
